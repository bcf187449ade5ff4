/// Tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Provides tokenization with attention masks for the ONNX embedder, and
/// token-level truncation for the embedding service.
use std::path::Path;

use anyhow::Result;
use tokenizers::Tokenizer;

/// Wrapper around the HuggingFace tokenizer for BERT/RoBERTa-style models.
pub struct ModelTokenizer {
    inner: Tokenizer,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
}

impl ModelTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    ///
    /// Sequences are truncated to `max_length` tokens and batches are padded
    /// to their longest member.
    pub fn from_model_dir(model_dir: &Path, max_length: usize) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("invalid truncation config: {e}"))?;

        inner.with_padding(Some(tokenizers::PaddingParams::default()));

        Ok(Self { inner })
    }

    /// Tokenize multiple texts in a batch, padded to a common length.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        Ok(encodings
            .iter()
            .map(|enc| TokenizerOutput {
                input_ids: enc.get_ids().iter().map(|&id| i64::from(id)).collect(),
                attention_mask: enc
                    .get_attention_mask()
                    .iter()
                    .map(|&m| i64::from(m))
                    .collect(),
            })
            .collect())
    }

    /// Cut `text` down to `max_tokens` tokens and decode it back to a string.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> Result<String> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("failed to encode text: {e}"))?;

        // The configured truncation may already have cut the sequence.
        let ids = encoding.get_ids();
        if ids.len() <= max_tokens && encoding.get_overflowing().is_empty() {
            return Ok(text.to_string());
        }

        self.inner
            .decode(&ids[..ids.len().min(max_tokens)], true)
            .map_err(|e| anyhow::anyhow!("failed to decode tokens: {e}"))
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}
