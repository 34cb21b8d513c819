mod server;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use pdf_rag_core::{
    CharacterNgramEmbedder, ChatCompletionsLlm, EmbeddingProvider, FolderWatcher, IndexHandle,
    IngestionOptions, IngestionPipeline, LlmProvider, OpenAiEmbeddings, QueryOptions,
    QueryService, RetryPolicy, WatcherOptions,
};
use pdf_rag_core::providers::OPENAI_BASE_URL;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::server::{app_router, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbeddingProviderKind {
    /// OpenAI `/embeddings`.
    Openai,
    /// Offline hashed character trigrams.
    Local,
}

#[derive(Parser)]
#[command(name = "pdf-rag-server", version)]
struct Cli {
    /// Folder watched for new PDFs.
    #[arg(long, env = "WATCH_DIR", default_value = "shared_documents")]
    watch_dir: PathBuf,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Maximum characters per chunk.
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Pages loaded per ingestion run.
    #[arg(long, env = "MAX_DOCUMENTS", default_value_t = 50)]
    max_documents: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "TOP_K", default_value_t = 4)]
    top_k: usize,

    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum, default_value_t = EmbeddingProviderKind::Openai)]
    embedding_provider: EmbeddingProviderKind,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Vector size produced by the embedding model.
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = 1536)]
    embedding_dimensions: usize,

    #[arg(long, env = "EMBEDDING_BASE_URL", default_value = OPENAI_BASE_URL)]
    embedding_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL", default_value = "llama3-8b-8192")]
    llm_model: String,

    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.groq.com/openai/v1")]
    llm_base_url: String,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Pending PDF paths buffered before the watcher blocks.
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 16)]
    queue_capacity: usize,

    /// Milliseconds a new file's size must stay unchanged before it is read.
    #[arg(long, env = "SETTLE_MS", default_value_t = 500)]
    settle_ms: u64,

    #[arg(long, env = "MAX_INGEST_ATTEMPTS", default_value_t = 3)]
    max_ingest_attempts: u32,

    /// Attempts per provider call for transient failures.
    #[arg(long, env = "PROVIDER_RETRIES", default_value_t = 3)]
    provider_retries: u32,

    /// Where failed PDFs are moved. Defaults to `<watch-dir>/failed`.
    #[arg(long, env = "DEAD_LETTER_DIR")]
    dead_letter_dir: Option<PathBuf>,

    /// Ingest PDFs already present in the watch folder at startup.
    #[arg(long, env = "SCAN_EXISTING", default_value_t = false)]
    scan_existing: bool,
}

fn required_secret(value: Option<String>, variable: &str) -> anyhow::Result<String> {
    match value {
        Some(secret) if !secret.trim().is_empty() => Ok(secret.trim().to_string()),
        _ => bail!("{variable} is not set; export it or add it to .env"),
    }
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(match cli.embedding_provider {
        EmbeddingProviderKind::Openai => {
            let api_key = required_secret(cli.openai_api_key.clone(), "OPENAI_API_KEY")?;
            let embedder = OpenAiEmbeddings::with_base_url(api_key, &cli.embedding_base_url)?
                .with_model(cli.embedding_model.clone(), cli.embedding_dimensions);
            Arc::new(embedder)
        }
        EmbeddingProviderKind::Local => Arc::new(CharacterNgramEmbedder::default()),
    })
}

fn build_llm(cli: &Cli) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let api_key = required_secret(cli.llm_api_key.clone(), "GROQ_API_KEY")?;
    let llm = ChatCompletionsLlm::new(api_key, &cli.llm_base_url, cli.llm_model.clone())?;
    Ok(Arc::new(llm))
}

/// Raises `shutdown` once `signal` fires. If the signal cannot be listened
/// for, this never completes, leaving the server running until killed.
async fn shutdown_on<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(error) = signal.await {
        warn!(error = %error, "could not listen for ctrl-c, graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    let _ = shutdown.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("failed to read .env");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = build_embedder(&cli)?;
    let llm = build_llm(&cli)?;

    let retry = RetryPolicy {
        max_attempts: cli.provider_retries.max(1),
        ..RetryPolicy::default()
    };
    let ingestion_options = IngestionOptions {
        chunk_max_chars: cli.chunk_size,
        chunk_overlap_chars: cli.chunk_overlap,
        max_documents: cli.max_documents,
        ..IngestionOptions::default()
    };
    let query_options = QueryOptions { top_k: cli.top_k };
    query_options.validate()?;

    let mut watcher_options = WatcherOptions::for_folder(&cli.watch_dir);
    watcher_options.queue_capacity = cli.queue_capacity;
    watcher_options.settle_interval = Duration::from_millis(cli.settle_ms);
    watcher_options.max_ingest_attempts = cli.max_ingest_attempts;
    watcher_options.scan_existing = cli.scan_existing;
    if let Some(dir) = &cli.dead_letter_dir {
        watcher_options.dead_letter_dir = dir.clone();
    }

    let index = IndexHandle::new();
    let pipeline = IngestionPipeline::new(Arc::clone(&embedder), index.clone(), ingestion_options)?
        .with_retry(retry.clone());
    let query = QueryService::new(index, embedder, llm, query_options).with_retry(retry);

    let watcher = FolderWatcher::new(&cli.watch_dir, Arc::new(pipeline), watcher_options)
        .with_context(|| format!("failed to watch {}", cli.watch_dir.display()))?;

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| "invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        watch_dir = %cli.watch_dir.display(),
        embedding_provider = ?cli.embedding_provider,
        llm_model = %cli.llm_model,
        "pdf-rag-server listening on http://{addr}"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_task = tokio::spawn(watcher.run(shutdown_rx));

    let app = app_router(AppState {
        query: Arc::new(query),
    });
    // the sender is dropped when serving ends, which also stops the watcher
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c(), shutdown_tx))
        .await
        .context("http server failed")?;

    watcher_task.await.context("watcher task failed")?;
    info!("pdf-rag-server stopped");
    Ok(())
}
