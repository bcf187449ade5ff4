/// Request handlers and wire types for the embedding service.
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::AppState;

/// Fixed creation stamp reported for the served model.
const MODEL_CREATED: i64 = 1_700_000_000;

// ── Wire types ───────────────────────────────────────────────────────

/// `input` accepts a single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Many(Vec<String>),
}

impl EmbeddingInput {
    fn into_texts(self) -> Vec<String> {
        match self {
            Self::Single(text) => vec![text],
            Self::Many(texts) => texts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    pub input: EmbeddingInput,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub object: String,
    pub index: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub model: String,
    pub dimensions: usize,
    pub device: String,
    pub max_tokens: usize,
    pub gpu: bool,
}

// ── Errors ───────────────────────────────────────────────────────────

/// Error rendered as `{"detail": ...}` with the given status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelCard {
            id: state.settings.served_id.clone(),
            object: "model".to_string(),
            created: MODEL_CREATED,
            owned_by: "local".to_string(),
            root: state.embedder.model_name().to_string(),
        }],
    })
}

pub async fn create_embeddings(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let texts = request.input.into_texts();
    if texts.is_empty() {
        return Err(ApiError::bad_request("Empty input"));
    }

    // Usage is reported on what the client sent, not on the truncated text.
    let word_count: usize = texts.iter().map(|t| t.split_whitespace().count()).sum();

    let embedder = state.embedder.clone();
    let max_tokens = state.settings.max_tokens;
    let embeddings = tokio::task::spawn_blocking(move || {
        let truncated: Vec<String> = texts
            .iter()
            .map(|t| embedder.truncate(t, max_tokens))
            .collect();
        let refs: Vec<&str> = truncated.iter().map(String::as_str).collect();
        embedder.embed_batch(&refs)
    })
    .await
    .map_err(|e| {
        error!("embedding task panicked: {e}");
        ApiError::internal(e.to_string())
    })?
    .map_err(|e| {
        error!("{e}");
        ApiError::internal(e.to_string())
    })?;

    let model = request
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.settings.served_id.clone());

    Ok(Json(EmbeddingResponse {
        object: "list".to_string(),
        data: embeddings
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingData {
                object: "embedding".to_string(),
                index,
                embedding,
            })
            .collect(),
        model,
        usage: Usage {
            prompt_tokens: word_count,
            total_tokens: word_count,
        },
    }))
}

pub async fn health_check(State(state): State<AppState>) -> Json<Health> {
    let device = state.embedder.device().to_string();
    Json(Health {
        status: "healthy".to_string(),
        model: state.embedder.model_name().to_string(),
        dimensions: state.embedder.dimensions(),
        gpu: device == "cuda",
        device,
        max_tokens: state.settings.max_tokens,
    })
}
