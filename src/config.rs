/// Configuration module for ragops.
///
/// Handles loading, validating, and providing default configuration values
/// for the embedding service, markdown export and RAG drivers. The timing
/// report takes no configuration.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_model_repo() -> String {
    "dangvantuan/vietnamese-embedding".to_string()
}

fn default_served_id() -> String {
    "vietnamese-embedding".to_string()
}

fn default_model_dir() -> String {
    "models/vietnamese-embedding".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_max_tokens() -> usize {
    200
}


fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_markdown_dir() -> String {
    "./docling_markdown".to_string()
}

fn default_rag_url() -> String {
    "http://localhost:9621".to_string()
}

fn default_results_dir() -> String {
    "./benchmark_results".to_string()
}

fn default_llm_base_url() -> String {
    "http://10.8.0.8:8000/v1".to_string()
}

fn default_llm_api_key() -> String {
    "not-needed".to_string()
}

fn default_llm_model() -> String {
    "Qwen3-Coder-30B-A3B-Instruct".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// HuggingFace repository the model files come from.
    #[serde(default = "default_model_repo")]
    pub model_repo: String,

    /// Model id advertised on the OpenAI-compatible endpoints.
    #[serde(default = "default_served_id")]
    pub served_id: String,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Inputs are cut to this many tokens before encoding.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Execution device for ONNX inference.
    #[serde(default)]
    pub device: Device,
}

/// Where the embedding model runs.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CUDA when the runtime reports it available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    /// CUDA only; model loading fails if it cannot be registered.
    Cuda,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_markdown_dir")]
    pub markdown_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Base URL of the LightRAG server.
    #[serde(default = "default_rag_url")]
    pub server_url: String,

    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_api_key")]
    pub api_key: String,

    /// Empty means "pick the first model the endpoint advertises".
    #[serde(default = "default_llm_model")]
    pub model: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_repo: default_model_repo(),
            served_id: default_served_id(),
            model_dir: default_model_dir(),
            dimensions: default_dimensions(),
            max_tokens: default_max_tokens(),
            device: Device::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            markdown_dir: default_markdown_dir(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            server_url: default_rag_url(),
            results_dir: default_results_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: default_llm_api_key(),
            model: default_llm_model(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// A missing file or invalid JSON falls back to defaults.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        let mut cfg = if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            Self::default()
        } else {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {path}"))?;

            match serde_json::from_str(&data) {
                Ok(c) => {
                    info!("Loaded configuration from {path}");
                    c
                }
                Err(e) => {
                    warn!("Invalid JSON in {path}: {e}");
                    warn!("Using default configuration");
                    Self::default()
                }
            }
        };

        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Override LLM settings from `LLM_BASE_URL`, `LLM_API_KEY` and `LLM_MODEL`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.max_tokens > 0,
            "embedding.max_tokens must be positive"
        );
        anyhow::ensure!(self.service.port > 0, "service.port must be positive");
        anyhow::ensure!(
            !self.export.markdown_dir.is_empty(),
            "export.markdown_dir must not be empty"
        );
        anyhow::ensure!(
            self.rag.server_url.starts_with("http://") || self.rag.server_url.starts_with("https://"),
            "rag.server_url must be an http(s) URL"
        );
        Ok(())
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.embedding.model_dir)
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
