/// HTTP clients for the LightRAG server and the OpenAI-compatible LLM endpoint.
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{BenchError, QueryEngine, QueryMode};
use crate::config::LlmConfig;

/// Delay between two indexing status checks after an insert.
const PIPELINE_POLL: Duration = Duration::from_secs(2);

/// Idle pipeline checks after which an untracked insert that was never seen
/// running counts as indexed.
const IDLE_CHECKS_BEFORE_DONE: u32 = 3;

/// Model families preferred for Vietnamese, in priority order.
pub const PREFERRED_MODELS: [&str; 9] = [
    "qwen", "llama", "gemma", "mistral", "mixtral", "vicuna", "wizardlm", "phind", "openchat",
];

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct PipelineStatus {
    #[serde(default)]
    busy: bool,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackStatus {
    #[serde(default)]
    documents: Vec<TrackedDocument>,
}

#[derive(Debug, Deserialize)]
struct TrackedDocument {
    #[serde(default)]
    status: String,
}

impl TrackedDocument {
    fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }

    fn is_settled(&self) -> bool {
        self.is_failed() || self.status.eq_ignore_ascii_case("processed")
    }
}

/// Whether every document of a tracked insert has left the queue.
fn indexing_finished(documents: &[TrackedDocument]) -> bool {
    !documents.is_empty() && documents.iter().all(TrackedDocument::is_settled)
}

/// Pipeline checks seen since an untracked insert.
///
/// The server queues indexing in the background, so an idle pipeline right
/// after the insert does not mean the text was indexed.
#[derive(Debug, Default)]
struct PipelineProgress {
    seen_busy: bool,
    idle_checks: u32,
}

impl PipelineProgress {
    /// Record one status check, returning true once indexing is over.
    fn observe(&mut self, busy: bool) -> bool {
        if busy {
            self.seen_busy = true;
            self.idle_checks = 0;
            return false;
        }
        self.idle_checks += 1;
        self.seen_busy || self.idle_checks >= IDLE_CHECKS_BEFORE_DONE
    }
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BenchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BenchError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Client for the LightRAG server REST API.
#[derive(Clone)]
pub struct LightRagClient {
    http: reqwest::Client,
    base_url: String,
    pipeline_timeout: Duration,
    poll_interval: Duration,
}

impl LightRagClient {
    /// `timeout` bounds each request and the wait for indexing after an insert.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BenchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ragops/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            pipeline_timeout: timeout,
            poll_interval: PIPELINE_POLL,
        })
    }

    /// Override the delay between indexing status checks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn pipeline_busy(&self) -> Result<bool, BenchError> {
        let resp = self
            .http
            .get(format!("{}/documents/pipeline_status", self.base_url))
            .send()
            .await?;
        let status: PipelineStatus = check_status(resp).await?.json().await?;
        Ok(status.busy)
    }

    async fn track_status(&self, track_id: &str) -> Result<TrackStatus, BenchError> {
        let resp = self
            .http
            .get(format!("{}/documents/track_status/{track_id}", self.base_url))
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    /// Wait until every document created by the insert `track_id` is processed
    /// or failed.
    async fn wait_for_track(&self, track_id: &str) -> Result<(), BenchError> {
        let started = Instant::now();
        loop {
            let status = self.track_status(track_id).await?;
            if indexing_finished(&status.documents) {
                let failed = status.documents.iter().filter(|d| d.is_failed()).count();
                if failed > 0 {
                    warn!("{failed} document(s) of {track_id} failed to index");
                }
                return Ok(());
            }
            if started.elapsed() > self.pipeline_timeout {
                return Err(BenchError::PipelineTimeout);
            }
            debug!("Waiting for {track_id} to be indexed...");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for the pipeline to run and go idle again, for servers that do
    /// not return a track id.
    async fn wait_for_pipeline(&self) -> Result<(), BenchError> {
        let started = Instant::now();
        let mut progress = PipelineProgress::default();
        while !progress.observe(self.pipeline_busy().await?) {
            if started.elapsed() > self.pipeline_timeout {
                return Err(BenchError::PipelineTimeout);
            }
            debug!("Indexing pipeline not done, waiting...");
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }
}

impl QueryEngine for LightRagClient {
    async fn insert(&self, text: &str) -> Result<(), BenchError> {
        let resp = self
            .http
            .post(format!("{}/documents/text", self.base_url))
            .json(&json!({ "text": text }))
            .send()
            .await?;
        let inserted: InsertResponse = check_status(resp).await?.json().await?;
        if inserted.status.eq_ignore_ascii_case("duplicated") {
            info!("Text already present on {}", self.base_url);
            return Ok(());
        }

        info!("Text submitted to {}, waiting for indexing", self.base_url);
        match inserted.track_id.filter(|id| !id.is_empty()) {
            Some(track_id) => self.wait_for_track(&track_id).await,
            None => self.wait_for_pipeline().await,
        }
    }

    async fn query(&self, query: &str, mode: QueryMode) -> Result<String, BenchError> {
        let resp = self
            .http
            .post(format!("{}/query", self.base_url))
            .json(&json!({
                "query": query,
                "mode": mode,
                "stream": false,
                "enable_rerank": false,
            }))
            .send()
            .await?;
        let body: QueryResponse = check_status(resp).await?.json().await?;
        Ok(body.response)
    }
}

/// Client for the OpenAI-compatible LLM endpoint backing the RAG server.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, BenchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    /// Ids of the models served at `{base_url}/models`.
    pub async fn list_models(&self) -> Result<Vec<String>, BenchError> {
        let resp = self
            .http
            .get(format!("{}/models", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let models: ModelsResponse = check_status(resp).await?.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    /// The configured model, or the best one the endpoint advertises.
    pub async fn resolve_model(&self) -> Result<String, BenchError> {
        if !self.config.model.is_empty() {
            return Ok(self.config.model.clone());
        }

        info!("LLM model not configured, asking {}", self.config.base_url);
        let models = self.list_models().await?;
        info!("Available models: {models:?}");
        let model = pick_model(&models)
            .ok_or_else(|| BenchError::NoModels(self.config.base_url.clone()))?;
        info!("Auto-selected model: {model}");
        Ok(model.to_string())
    }
}

/// First model matching the highest-priority family in [`PREFERRED_MODELS`]
/// (case-insensitive substring), otherwise the first model listed.
fn pick_model(available: &[String]) -> Option<&str> {
    PREFERRED_MODELS
        .iter()
        .find_map(|family| {
            available
                .iter()
                .find(|model| model.to_lowercase().contains(family))
        })
        .or_else(|| available.first())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(models: &[&str]) -> Vec<String> {
        models.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_pick_model_prefers_known_families() {
        assert_eq!(pick_model(&names(&["foo", "Llama-3"])), Some("Llama-3"));
        // Family priority wins over listing order
        assert_eq!(
            pick_model(&names(&["mistral-7b", "gemma-2", "Qwen2.5-7B"])),
            Some("Qwen2.5-7B")
        );
        assert_eq!(pick_model(&names(&["foo", "bar"])), Some("foo"));
        assert_eq!(pick_model(&[]), None);
    }

    #[test]
    fn test_indexing_finished() {
        let docs = |statuses: &[&str]| -> Vec<TrackedDocument> {
            statuses
                .iter()
                .map(|s| TrackedDocument {
                    status: s.to_string(),
                })
                .collect()
        };
        assert!(!indexing_finished(&docs(&[])));
        assert!(!indexing_finished(&docs(&["processed", "pending"])));
        assert!(!indexing_finished(&docs(&["processing"])));
        assert!(indexing_finished(&docs(&["processed", "failed"])));
    }

    #[test]
    fn test_pipeline_progress_waits_for_run() {
        // Idle before the queued job starts, then busy, then idle
        let mut progress = PipelineProgress::default();
        assert!(!progress.observe(false));
        assert!(!progress.observe(true));
        assert!(!progress.observe(true));
        assert!(progress.observe(false));

        // Never seen busy: done only after several idle checks
        let mut progress = PipelineProgress::default();
        assert!(!progress.observe(false));
        assert!(!progress.observe(false));
        assert!(progress.observe(false));
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = LightRagClient::new("http://localhost:9621/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9621");
    }

    #[test]
    fn test_query_response_parsing() {
        let body: QueryResponse = serde_json::from_str(r#"{"response": "Hà Nội"}"#).unwrap();
        assert_eq!(body.response, "Hà Nội");
        let status: PipelineStatus = serde_json::from_str(r#"{"busy": true, "job_name": "x"}"#).unwrap();
        assert!(status.busy);
        let models: ModelsResponse =
            serde_json::from_str(r#"{"object":"list","data":[{"id":"m1","object":"model"}]}"#).unwrap();
        assert_eq!(models.data[0].id, "m1");
    }

    #[tokio::test]
    async fn test_resolve_configured_model_skips_network() {
        let client = LlmClient::new(LlmConfig {
            base_url: "http://127.0.0.1:9/v1".to_string(),
            api_key: "k".to_string(),
            model: "fixed".to_string(),
        })
        .unwrap();
        assert_eq!(client.resolve_model().await.unwrap(), "fixed");
    }

    async fn spawn_server(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_insert_waits_for_tracked_document() {
        use axum::extract::State;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let checks = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/documents/text",
                post(|| async {
                    Json(json!({"status": "success", "message": "queued", "track_id": "insert_1"}))
                }),
            )
            // An idle pipeline must not end the wait on its own
            .route(
                "/documents/pipeline_status",
                get(|| async { Json(json!({"busy": false})) }),
            )
            .route(
                "/documents/track_status/:track_id",
                get(|State(checks): State<Arc<AtomicUsize>>| async move {
                    let status = match checks.fetch_add(1, Ordering::SeqCst) {
                        0 => None,
                        1 => Some("pending"),
                        2 => Some("processing"),
                        _ => Some("processed"),
                    };
                    let documents: Vec<serde_json::Value> = status
                        .map(|s| json!({"id": "doc-1", "status": s}))
                        .into_iter()
                        .collect();
                    let total = documents.len();
                    Json(json!({"track_id": "insert_1", "documents": documents, "total_count": total}))
                }),
            )
            .with_state(checks.clone());

        let base = spawn_server(app).await;
        let client = LightRagClient::new(&base, Duration::from_secs(5))
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        client.insert("corpus").await.unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_untracked_insert_waits_for_pipeline_run() {
        use axum::extract::State;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let checks = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/documents/text",
                post(|| async { Json(json!({"status": "success", "message": "queued"})) }),
            )
            .route(
                "/documents/pipeline_status",
                get(|State(checks): State<Arc<AtomicUsize>>| async move {
                    // Not started yet, then running twice, then idle
                    let busy = matches!(checks.fetch_add(1, Ordering::SeqCst), 1 | 2);
                    Json(json!({"busy": busy}))
                }),
            )
            .with_state(checks.clone());

        let base = spawn_server(app).await;
        let client = LightRagClient::new(&base, Duration::from_secs(5))
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        client.insert("corpus").await.unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 4);
    }
}
