use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragops::bench::{self, BenchmarkReport, QueryMode, client::LightRagClient, client::LlmClient};
use ragops::config::Config;
use ragops::embedder::mock::MockEmbedder;
use ragops::embedder::{self, Embedder, download};
use ragops::export::{AutoConverter, DocumentConverter, MarkdownExport};
use ragops::service::{self, AppState};
use ragops::timing::{self, report, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragops", version, about = "Operational toolkit for a LightRAG deployment")]
struct Cli {
    /// Configuration file (not used by the timing report)
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    /// Without a subcommand, print the file-processing timing report
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the timing log in real time
    Watch,
    /// Serve the OpenAI-compatible embedding API
    Serve {
        /// Serve deterministic mock vectors instead of loading the model
        #[arg(long)]
        mock: bool,
    },
    /// Download the embedding model files
    DownloadModel,
    /// Convert documents to markdown and save them to the export directory
    Export {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Embed sample sentences, insert the sample corpus and query every mode
    Demo,
    /// Time every sample query in every mode and save a JSON report
    Bench,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => {
            print!("{}", report::render_report(Path::new(timing::TIMING_LOG_FILE)));
            println!("\n💡 Tip: Run with 'watch' argument to monitor in real-time");
            println!("   ragops watch");
            Ok(())
        }
        Some(Command::Watch) => run_watch().await,
        Some(Command::Serve { mock }) => run_serve(load_config(&cli.config)?, mock).await,
        Some(Command::DownloadModel) => run_download(load_config(&cli.config)?).await,
        Some(Command::Export { files }) => run_export(&load_config(&cli.config)?, &files),
        Some(Command::Demo) => run_demo(load_config(&cli.config)?).await,
        Some(Command::Bench) => run_bench(load_config(&cli.config)?).await,
    }
}

fn load_config(path: &str) -> Result<Config> {
    let config = Config::load(path)?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            return;
        }
        token.cancel();
    });
}

async fn run_watch() -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut cursor = watch::TailCursor::new(timing::TIMING_LOG_FILE);
    let mut stdout = std::io::stdout();
    watch::watch(&mut cursor, watch::POLL_INTERVAL, &cancel, &mut stdout).await?;

    println!("\n\n✋ Stopped watching");
    Ok(())
}

/// The configured model, or an error pointing at `download-model`.
fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    embedder::from_config(&config.embedding).context("run `ragops download-model` first")
}

async fn run_serve(config: Config, mock: bool) -> Result<()> {
    let embedder: Arc<dyn Embedder> = if mock {
        warn!("Serving mock embeddings, vectors carry no meaning");
        Arc::new(MockEmbedder::new(config.embedding.dimensions))
    } else {
        load_embedder(&config)?
    };
    let state = AppState::new(embedder, config.embedding.clone());

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    service::serve(&config.bind_addr(), state, shutdown).await
}

async fn run_download(config: Config) -> Result<()> {
    let repo = config.embedding.model_repo.clone();
    let model_dir = config.model_dir();
    tokio::task::spawn_blocking(move || download::download_model_files(&repo, &model_dir))
        .await
        .context("download task panicked")?
}

fn run_export(config: &Config, files: &[PathBuf]) -> Result<()> {
    let exporter = MarkdownExport::new(AutoConverter, &config.export.markdown_dir);
    info!(
        "Markdown files will be saved to: {}",
        std::path::absolute(exporter.output_dir())
            .unwrap_or_else(|_| exporter.output_dir().to_path_buf())
            .display()
    );

    let mut failed = 0usize;
    for file in files {
        match exporter.convert(file) {
            Ok(markdown) => println!(
                "✓ {} → {} ({} chars)",
                file.display(),
                exporter.markdown_path(file).display(),
                markdown.chars().count()
            ),
            Err(e) => {
                failed += 1;
                warn!("Could not convert {}: {e:#}", file.display());
            }
        }
    }

    anyhow::ensure!(failed == 0, "{failed} of {} documents failed to convert", files.len());
    Ok(())
}

fn rag_client(config: &Config) -> Result<LightRagClient> {
    LightRagClient::new(
        &config.rag.server_url,
        Duration::from_secs(config.rag.timeout_secs),
    )
    .context("failed to build LightRAG client")
}

/// The LLM model name, falling back to the configured value when the
/// endpoint cannot be reached.
async fn llm_model(config: &Config) -> String {
    let resolved = match LlmClient::new(config.llm.clone()) {
        Ok(client) => client.resolve_model().await,
        Err(e) => Err(e),
    };
    resolved.unwrap_or_else(|e| {
        warn!("Could not resolve LLM model: {e}");
        config.llm.model.clone()
    })
}

async fn run_demo(config: Config) -> Result<()> {
    let model = llm_model(&config).await;

    println!("\n{}", "=".repeat(60));
    println!("LightRAG demo with local LLM and Vietnamese embedding");
    println!("{}", "=".repeat(60));
    println!("\nConfiguration:");
    println!("  - LLM API: {}", config.llm.base_url);
    println!("  - LLM Model: {model}");
    println!("  - Embedding: {}", config.embedding.model_repo);
    println!("  - Embedding Dim: {}", config.embedding.dimensions);
    println!("  - RAG server: {}", config.rag.server_url);

    let embedder = load_embedder(&config)?;
    let (count, dim) = bench::embedding_self_test(embedder.as_ref())?;
    println!("\n✓ Texts embedded: {count}");
    println!("✓ Embedding dimension: {dim}");

    let client = rag_client(&config)?;
    bench::run_demo(&client, bench::SAMPLE_CORPUS, &bench::SAMPLE_QUERIES).await?;

    println!("\n{}", "=".repeat(60));
    println!("Demo complete!");
    println!("{}", "=".repeat(60));
    Ok(())
}

async fn run_bench(config: Config) -> Result<()> {
    let model = llm_model(&config).await;

    println!("\n{}", "=".repeat(100));
    println!("🚀 LightRAG Benchmark - Query Mode Performance");
    println!("{}", "=".repeat(100));
    println!("\nModel: {model}");
    println!("Embedding: {}", config.embedding.model_repo);
    println!("Timestamp: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

    let client = rag_client(&config)?;
    let results = bench::run_benchmark(
        &client,
        bench::SAMPLE_CORPUS,
        &bench::SAMPLE_QUERIES,
        &QueryMode::ALL,
        &mut std::io::stdout(),
    )
    .await?;

    let report = BenchmarkReport::new(&model, &config.embedding.model_repo, results);
    print!("{}", bench::report::render_results_table(&report.results));
    print!("{}", bench::report::render_summary(&report.summary));

    let path = report.save(Path::new(&config.rag.results_dir))?;
    println!("\n💾 Report saved to: {}", path.display());

    println!("\n{}", "=".repeat(100));
    println!("✅ Benchmark completed!");
    println!("{}", "=".repeat(100));
    Ok(())
}
