//! sensebatch-worker: pull ambiguous units and resolve them immediately.
//!
//! Usage:
//!   sensebatch-worker --server http://queue:5000 --congruent 1 --modulo 4
//!   sensebatch-worker --direct --database sqlite://senses.db --engine chat_completions
//!
//! Exit codes: 0 nothing left to resolve, 1 fatal, 2 configuration,
//! 3 stopped early or left units unresolved.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use sensebatch_core::config::EngineKind;
use sensebatch_core::{shutdown, ExitStatus, RetryPolicy, SenseConfig, SenseError, WorkStore};
use sensebatch_worker::engine;
use sensebatch_worker::{QueueClient, StoreSource, WorkSource, Worker, WorkerOptions};

#[derive(Parser, Debug)]
#[command(name = "sensebatch-worker")]
#[command(about = "Resolve ambiguous units through a local or hosted model")]
struct Args {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "SENSEBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Work queue server base URL (overrides configuration)
    #[arg(long)]
    server: Option<String>,

    /// Work on the store directly instead of through the server
    #[arg(long)]
    direct: bool,

    /// Store connection string for --direct (overrides configuration)
    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    congruent: Option<i64>,
    #[arg(long)]
    modulo: Option<i64>,

    /// Stop after this many units
    #[arg(long)]
    limit: Option<u32>,

    /// ollama or chat_completions
    #[arg(long)]
    engine: Option<EngineKind>,

    #[arg(long)]
    model: Option<String>,

    /// Inference endpoint base URL
    #[arg(long)]
    inference_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensebatch_worker=debug".into()),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(status) => status.into(),
        Err(e) => {
            tracing::error!(error = %e, "sensebatch-worker failed");
            e.exit_status().into()
        }
    }
}

async fn run(args: Args) -> Result<ExitStatus, SenseError> {
    let mut config = SenseConfig::load(args.config.as_deref())?;
    if let Some(url) = args.server {
        config.worker.server_url = url;
    }
    if let Some(url) = args.database {
        config.store.url = url;
    }
    if args.congruent.is_some() || args.modulo.is_some() {
        config.congruent = args.congruent;
        config.modulo = args.modulo;
    }
    if args.limit.is_some() {
        config.limit = args.limit;
    }
    if let Some(engine) = args.engine {
        config.worker.engine = engine;
    }
    if let Some(model) = args.model {
        config.worker.model = model;
    }
    if let Some(url) = args.inference_url {
        config.worker.inference_url = url;
    }
    config.validate()?;

    let retry = RetryPolicy::new(config.retry_cap());
    let source: Arc<dyn WorkSource> = if args.direct {
        let store = WorkStore::connect(&config.store).await?;
        tracing::info!(url = %config.store.url, "Resolving directly against the store");
        Arc::new(StoreSource::new(store))
    } else {
        tracing::info!(server = %config.worker.server_url, "Resolving through the work queue");
        Arc::new(QueueClient::new(
            &config.worker.server_url,
            Duration::from_secs(config.worker.request_timeout_secs),
            retry,
        )?)
    };
    let engine = engine::from_config(&config.worker)?;
    tracing::info!(engine = ?config.worker.engine, model = engine.model(), "Engine ready");

    let options = WorkerOptions {
        shard: config.shard()?,
        page_size: config.worker.page_size,
        limit: config.limit,
    };
    let worker = Worker::new(source, engine, retry, options);
    let summary = worker.run(shutdown::listen_for_signals()).await?;

    if !summary.skipped.is_empty() {
        tracing::warn!(units = ?summary.skipped, "Units left unresolved");
    }
    Ok(summary.exit_status())
}
