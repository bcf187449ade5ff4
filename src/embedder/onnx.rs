/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads a sentence-transformer ONNX export, runs batched inference, applies
/// mean pooling with attention mask, and L2-normalizes the result.
use std::path::Path;
use std::sync::Mutex;

use ort::ep::{CUDA, ExecutionProvider, ExecutionProviderDispatch};
use ort::session::Session;
use ort::value::Tensor;
use tracing::{info, warn};

use super::tokenizer::ModelTokenizer;
use super::{BATCH_SIZE, Embedder, EmbedderError, l2_normalize, truncate_chars};
use crate::config::Device;

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: ModelTokenizer,
    dimensions: usize,
    model_name: String,
    device: &'static str,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    ///
    /// `max_length` bounds the token sequence fed to the model.
    pub fn new(
        model_dir: &Path,
        model_name: &str,
        dimensions: usize,
        max_length: usize,
        device: Device,
    ) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let (providers, device_name) = execution_providers(device);
        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_execution_providers(providers)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("execution provider error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .with_inter_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        info!("ONNX model loaded: {model_name} on {device_name}");

        let tokenizer = ModelTokenizer::from_model_dir(model_dir, max_length)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer error: {e}")))?;

        info!("Tokenizer loaded (vocab size: {})", tokenizer.vocab_size());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
            model_name: model_name.to_string(),
            device: device_name,
        })
    }

    /// Run one padded batch through the model.
    fn embed_group(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        let batch = tokens.len();
        let seq_len = tokens.first().map_or(0, |t| t.input_ids.len());
        if tokens.iter().any(|t| t.input_ids.len() != seq_len) {
            return Err(EmbedderError::TokenizerError(
                "batch is not padded to a common length".to_string(),
            ));
        }

        let input_ids: Vec<i64> = tokens.iter().flat_map(|t| t.input_ids.clone()).collect();
        let attention_mask: Vec<i64> = tokens
            .iter()
            .flat_map(|t| t.attention_mask.clone())
            .collect();

        // (shape, data) tuple form avoids ndarray version coupling with ort
        let input_ids_val = Tensor::from_array(([batch, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array(([batch, seq_len], attention_mask))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array(([batch, seq_len], vec![0i64; batch * seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // Output shape: [batch, seq_len, hidden_size]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let row = seq_len * self.dimensions;
        if hidden_data.len() < batch * row {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} for batch {batch}x{seq_len}x{}",
                hidden_data.len(),
                self.dimensions
            )));
        }

        Ok(tokens
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let pooled = mean_pooling(
                    &hidden_data[i * row..(i + 1) * row],
                    &t.attention_mask,
                    seq_len,
                    self.dimensions,
                );
                l2_normalize(&pooled)
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_group(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(BATCH_SIZE) {
            embeddings.extend(self.embed_group(group)?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> &str {
        self.device
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        match self.tokenizer.truncate(text, max_tokens) {
            Ok(truncated) => truncated,
            Err(e) => {
                warn!("Token truncation failed, falling back to chars: {e}");
                truncate_chars(text, max_tokens * 4)
            }
        }
    }
}

/// Execution providers to register for `device`, and the device name they
/// amount to. An empty list leaves ONNX Runtime on its CPU provider.
fn execution_providers(device: Device) -> (Vec<ExecutionProviderDispatch>, &'static str) {
    let cuda = CUDA::default();
    match device {
        Device::Cpu => (Vec::new(), "cpu"),
        Device::Cuda => (vec![cuda.build().error_on_failure()], "cuda"),
        Device::Auto => {
            if cuda.is_available().unwrap_or(false) {
                (vec![cuda.build()], "cuda")
            } else {
                (Vec::new(), "cpu")
            }
        }
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pooling_simple() {
        let hidden = vec![1.0, 2.0, 3.0];
        let mask = vec![1i64];
        assert_eq!(mean_pooling(&hidden, &mask, 1, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mean_pooling_with_padding() {
        // 2 tokens, hidden_size=2, second token is padding (mask=0)
        let hidden = vec![1.0, 2.0, 10.0, 20.0];
        let mask = vec![1i64, 0i64];
        assert_eq!(mean_pooling(&hidden, &mask, 2, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn test_mean_pooling_averages_tokens() {
        let hidden = vec![1.0, 3.0, 3.0, 5.0];
        let mask = vec![1i64, 1i64];
        assert_eq!(mean_pooling(&hidden, &mask, 2, 2), vec![2.0, 4.0]);
    }

    #[test]
    fn test_cpu_device_registers_no_provider() {
        let (providers, name) = execution_providers(Device::Cpu);
        assert!(providers.is_empty());
        assert_eq!(name, "cpu");

        let (providers, name) = execution_providers(Device::Cuda);
        assert_eq!(providers.len(), 1);
        assert_eq!(name, "cuda");
    }

    #[test]
    fn test_missing_model_dir() {
        let result = OnnxEmbedder::new(Path::new("/nonexistent"), "x", 768, 200, Device::Cpu);
        assert!(matches!(result, Err(EmbedderError::ModelLoadFailed(_))));
    }

    /// Integration test requiring actual model files.
    #[test]
    #[ignore]
    fn test_onnx_embed_batch() {
        let model_dir = Path::new("models/vietnamese-embedding");
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder =
            OnnxEmbedder::new(model_dir, "dangvantuan/vietnamese-embedding", 768, 200, Device::Cpu)
                .unwrap();
        assert_eq!(embedder.device(), "cpu");
        let texts: Vec<&str> = vec!["Xin chào Việt Nam"; 10];
        let results = embedder.embed_batch(&texts).unwrap();
        assert_eq!(results.len(), 10);
        let norm: f32 = results[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "expected unit vector, got norm={norm}");
    }
}
