/// Embedder trait and shared types for sentence embedding.
///
/// One embedder instance is built at start-up and shared behind
/// `Arc<dyn Embedder>` by every consumer (HTTP service, demo driver).
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Texts encoded per inference call.
pub const BATCH_SIZE: usize = 8;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`. Returned vectors are L2-normalized.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, preserving order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Identifier of the underlying model.
    fn model_name(&self) -> &str;

    /// Compute device the model runs on.
    fn device(&self) -> &str {
        "cpu"
    }

    /// Shorten `text` to at most `max_tokens` model tokens.
    ///
    /// Without a tokenizer, approximates with four characters per token.
    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        truncate_chars(text, max_tokens * 4)
    }
}

/// Build the process-wide embedder described by `config`.
///
/// Fails when the model files have not been downloaded yet.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    let model_dir = Path::new(&config.model_dir);
    if !download::all_files_present(model_dir) {
        return Err(EmbedderError::ModelLoadFailed(format!(
            "model files not found in {}",
            model_dir.display()
        )));
    }

    let embedder = onnx::OnnxEmbedder::new(
        model_dir,
        &config.model_repo,
        config.dimensions,
        config.max_tokens,
        config.device,
    )?;
    Ok(Arc::new(embedder))
}

/// Keep the first `max_chars` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// L2-normalize a vector, returning the normalized copy.
#[must_use]
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}
