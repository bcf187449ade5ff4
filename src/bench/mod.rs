//! Demo and benchmark drivers for a running LightRAG server.
//!
//! The RAG engine itself lives behind [`QueryEngine`]; [`client::LightRagClient`]
//! reaches it over HTTP. Drivers insert a sample corpus, then run each sample
//! question in every [`QueryMode`].
pub mod client;
pub mod report;

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::str::FromStr;
use std::time::Instant;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedder::{Embedder, EmbedderError};

pub use report::{BenchmarkReport, ModeSummary, QueryBenchmarkResult, Summary};

/// Errors raised while talking to the RAG or LLM endpoints.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("no models available at {0}")]
    NoModels(String),

    #[error("timed out waiting for the indexing pipeline")]
    PipelineTimeout,

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retrieval strategy of a LightRAG query.
/// Ordered as [`QueryMode::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Naive,
    Local,
    Global,
    Hybrid,
}

impl QueryMode {
    pub const ALL: [QueryMode; 4] = [Self::Naive, Self::Local, Self::Global, Self::Hybrid];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Local => "local",
            Self::Global => "global",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown query mode: {s}"))
    }
}

/// A RAG engine that can ingest text and answer questions.
pub trait QueryEngine {
    /// Ingest `text` and wait until it is queryable.
    fn insert(&self, text: &str) -> impl Future<Output = Result<(), BenchError>> + Send;

    /// Answer `query` using retrieval strategy `mode`.
    fn query(
        &self,
        query: &str,
        mode: QueryMode,
    ) -> impl Future<Output = Result<String, BenchError>> + Send;
}

// ── Sample data ──────────────────────────────────────────────────────

pub const SAMPLE_CORPUS: &str = "\
Hà Nội là thủ đô của Việt Nam, nằm ở phía Bắc của đất nước. \
Thành phố có lịch sử hơn 1000 năm với nhiều di tích lịch sử như Văn Miếu, \
Hoàng Thành Thăng Long và Hồ Gươm.

TP. Hồ Chí Minh là thành phố lớn nhất Việt Nam, nằm ở phía Nam. \
Đây là trung tâm kinh tế và tài chính của cả nước với nhiều tòa nhà cao tầng \
và khu công nghiệp.

Công ty VNG là một trong những công ty công nghệ hàng đầu Việt Nam, \
được thành lập năm 2004. Công ty nổi tiếng với sản phẩm Zalo - \
ứng dụng nhắn tin phổ biến nhất tại Việt Nam.

FPT là tập đoàn công nghệ lớn nhất Việt Nam, hoạt động trong lĩnh vực \
phần mềm, viễn thông và giáo dục. FPT Software là công ty con chuyên về \
outsourcing phần mềm.

Ngành trí tuệ nhân tạo (AI) đang phát triển rất nhanh tại Việt Nam. \
Nhiều startup công nghệ đang ứng dụng AI vào các lĩnh vực như y tế, \
giáo dục và tài chính.
";

pub const SAMPLE_QUERIES: [&str; 3] = [
    "Hà Nội có những địa điểm nổi tiếng nào?",
    "Công ty công nghệ nào lớn nhất Việt Nam?",
    "Ngành AI phát triển như thế nào tại Việt Nam?",
];

pub const SAMPLE_EMBED_TEXTS: [&str; 3] = [
    "Xin chào Việt Nam",
    "Công nghệ trí tuệ nhân tạo đang phát triển mạnh mẽ",
    "Hà Nội là thủ đô của Việt Nam",
];

/// Answers longer than this are cut in demo output.
const DEMO_PREVIEW_CHARS: usize = 500;

// ── Drivers ──────────────────────────────────────────────────────────

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Entities are approximated by markdown bold spans in the answer.
#[must_use]
pub fn count_entities(response: &str) -> usize {
    response.matches("**").count() / 2
}

/// Run one timed query. Failures are recorded as an `ERROR: ...` response.
pub async fn benchmark_query<E: QueryEngine>(
    engine: &E,
    query: &str,
    mode: QueryMode,
) -> QueryBenchmarkResult {
    let started = Instant::now();
    let response = match engine.query(query, mode).await {
        Ok(text) => text,
        Err(e) => format!("ERROR: {e}"),
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    QueryBenchmarkResult {
        query: query.to_string(),
        mode,
        execution_time_ms: round_to(elapsed_ms, 2),
        entities_count: count_entities(&response),
        response_length: response.chars().count(),
        timestamp: Local::now().to_rfc3339(),
    }
}

/// Insert `corpus`, then time every query in every mode, writing progress
/// to `out`.
pub async fn run_benchmark<E: QueryEngine, W: Write>(
    engine: &E,
    corpus: &str,
    queries: &[&str],
    modes: &[QueryMode],
    out: &mut W,
) -> Result<Vec<QueryBenchmarkResult>, BenchError> {
    writeln!(out, "\n📥 Inserting data...")?;
    out.flush()?;
    let insert_start = Instant::now();
    engine.insert(corpus).await?;
    writeln!(
        out,
        "✓ Insert completed in {:.2}ms",
        insert_start.elapsed().as_secs_f64() * 1000.0
    )?;

    writeln!(
        out,
        "\n🎯 Running {} queries x {} modes = {} total queries...",
        queries.len(),
        modes.len(),
        queries.len() * modes.len()
    )?;

    let mut results = Vec::with_capacity(queries.len() * modes.len());
    for (i, query) in queries.iter().enumerate() {
        writeln!(out, "\n{}", "=".repeat(100))?;
        writeln!(out, "Query {}/{}: {query}", i + 1, queries.len())?;
        writeln!(out, "{}", "=".repeat(100))?;

        for &mode in modes {
            write!(out, "  Testing {mode}... ")?;
            // Show the label while the query is still running
            out.flush()?;
            let result = benchmark_query(engine, query, mode).await;
            writeln!(out, "✓ {:.2}ms", result.execution_time_ms)?;
            results.push(result);
        }
    }

    Ok(results)
}

/// Shorten a demo answer to its preview length.
#[must_use]
pub fn preview(response: &str) -> String {
    match response.char_indices().nth(DEMO_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &response[..idx]),
        None => response.to_string(),
    }
}

/// Embedding self-test: returns `(texts embedded, vector dimension)`.
pub fn embedding_self_test(embedder: &dyn Embedder) -> Result<(usize, usize), BenchError> {
    let vectors = embedder.embed_batch(&SAMPLE_EMBED_TEXTS)?;
    let dim = vectors.first().map_or(0, Vec::len);
    Ok((vectors.len(), dim))
}

/// Insert `corpus` and print the answer to every query in every mode.
///
/// A failing mode is reported and the demo moves on.
pub async fn run_demo<E: QueryEngine>(
    engine: &E,
    corpus: &str,
    queries: &[&str],
) -> Result<(), BenchError> {
    println!("\n{}", "=".repeat(60));
    println!("DEMO INSERT & QUERY");
    println!("{}", "=".repeat(60));

    println!("\nInserting sample data...");
    engine.insert(corpus).await?;
    println!("✓ Insert done!");

    for query in queries {
        println!("\n{}", "=".repeat(60));
        println!("Question: {query}");
        println!("{}", "=".repeat(60));

        for mode in QueryMode::ALL {
            println!("\n--- Query mode: {mode} ---");
            match engine.query(query, mode).await {
                Ok(answer) => println!("{}", preview(&answer)),
                Err(e) => println!("Error in mode {mode}: {e}"),
            }
        }
    }

    Ok(())
}
