//! sensebatch-server: work queue for pull-based disambiguation workers.
//!
//! Reads the shared YAML configuration (`--config` / `SENSEBATCH_CONFIG`)
//! with `SENSEBATCH_*` environment overrides:
//!   SENSEBATCH_DATABASE_URL  work store location
//!   SENSEBATCH_BIND_ADDR     listen address (default: 0.0.0.0:5000)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sensebatch_core::{shutdown, SenseConfig, SenseError, WorkStore};
use sensebatch_server::router::build_router;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "sensebatch-server")]
#[command(about = "Serve unresolved units to disambiguation workers")]
struct Args {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "SENSEBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Store connection string (overrides configuration)
    #[arg(long)]
    database: Option<String>,

    /// Listen address (overrides configuration)
    #[arg(long)]
    bind: Option<String>,

    /// Store connections. One connection serializes all writes.
    #[arg(long, default_value_t = 1)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensebatch_server=debug,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "sensebatch-server failed");
            e.exit_status().into()
        }
    }
}

async fn serve(args: Args) -> Result<(), SenseError> {
    let mut config = SenseConfig::load(args.config.as_deref())?;
    if let Some(url) = args.database {
        config.store.url = url;
    }
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    config.store.max_connections = args.max_connections;
    config.validate()?;

    let store = WorkStore::connect(&config.store).await?;
    tracing::info!(
        url = %config.store.url,
        unresolved = store.count_unresolved().await?,
        "Connected to work store"
    );

    let app = build_router(store);

    let bind_addr = config.server.bind_addr;
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        SenseError::Configuration(format!("failed to bind to {bind_addr}: {e}"))
    })?;
    tracing::info!("sensebatch-server listening on {bind_addr}");

    let mut stop = shutdown::listen_for_signals();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !shutdown::requested(&stop) {
                if stop.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| SenseError::Internal(anyhow::anyhow!("server error: {e}")))?;

    tracing::info!("sensebatch-server stopped");
    Ok(())
}
