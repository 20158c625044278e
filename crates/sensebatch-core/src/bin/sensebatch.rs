//! sensebatch: batch lifecycle CLI.
//!
//! Usage:
//!   sensebatch init
//!   sensebatch build --congruent 0 --modulo 4 --limit 5000
//!   sensebatch check
//!   sensebatch monitor --batch 7
//!   sensebatch fetch
//!   sensebatch reconcile
//!
//! Exit codes: 0 success or nothing pending, 1 fatal, 2 configuration,
//! 3 finished but work remains, 4 nothing eligible, 5 reconciliation alert.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use sensebatch_core::provider::{BatchProvider, OpenAiBatchProvider, ProviderBatch, SubmitMetadata};
use sensebatch_core::{
    shutdown, BatchBuilder, BatchFetcher, BatchMonitor, BuildOptions, BuildOutcome, ExitStatus,
    MonitorOutcome, Reconciler, RetryPolicy, SenseConfig, SenseError, WorkStore,
};

#[derive(Parser, Debug)]
#[command(name = "sensebatch")]
#[command(about = "Submit, monitor and drain word-sense disambiguation batches")]
struct Cli {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "SENSEBATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Store connection string (overrides configuration)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and report unit counts
    Init,

    /// Select eligible units and submit them as one batch
    Build {
        #[arg(long)]
        congruent: Option<i64>,
        #[arg(long)]
        modulo: Option<i64>,
        /// Maximum number of units in the batch
        #[arg(long)]
        limit: Option<u32>,
        /// Also write the NDJSON payload here
        #[arg(long)]
        payload_file: Option<PathBuf>,
        /// Render the payload only; open and submit nothing
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        description: Option<String>,
    },

    /// Poll every sent batch once
    Check {
        #[arg(long)]
        batch: Option<i64>,
    },

    /// Poll until the target batch (or every open batch) settles
    Monitor {
        #[arg(long)]
        batch: Option<i64>,
        /// Seconds between polls (overrides configuration)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Drain every completed batch
    Fetch,

    /// Report orphaned batches and double-assigned units
    Reconcile {
        /// Age in seconds after which an unsent batch is orphaned
        #[arg(long)]
        threshold: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensebatch_core=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            let status = e.exit_status();
            if status == ExitStatus::NoWork {
                tracing::info!("{e}");
            } else {
                tracing::error!(error = %e, "sensebatch failed");
            }
            status.into()
        }
    }
}

async fn run(cli: Cli) -> Result<ExitStatus, SenseError> {
    let mut config = SenseConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database {
        config.store.url = url;
    }
    if let Command::Build {
        congruent,
        modulo,
        limit,
        ..
    } = &cli.command
    {
        if congruent.is_some() || modulo.is_some() {
            config.congruent = *congruent;
            config.modulo = *modulo;
        }
        if limit.is_some() {
            config.limit = *limit;
        }
    }
    config.validate()?;

    let store = WorkStore::connect(&config.store).await?;
    let retry = RetryPolicy::new(config.retry_cap());

    match cli.command {
        Command::Init => {
            let unresolved = store.count_unresolved().await?;
            println!(
                "schema ready at {}; {unresolved} ambiguous units unresolved",
                config.store.url
            );
            Ok(ExitStatus::Success)
        }

        Command::Build {
            payload_file,
            dry_run,
            description,
            ..
        } => {
            let provider: Arc<dyn BatchProvider> = if dry_run {
                Arc::new(DryRunProvider)
            } else {
                Arc::new(OpenAiBatchProvider::new(&config.provider)?)
            };
            let builder = BatchBuilder::new(store, provider, config.provider.model.clone(), retry);
            let options = BuildOptions {
                payload_path: payload_file,
                dry_run,
                description,
            };
            match builder.build_and_submit(config.shard()?, config.limit, &options).await? {
                BuildOutcome::Submitted {
                    batch_id,
                    external_id,
                    units,
                } => println!("batch {batch_id} sent as {external_id} with {units} units"),
                BuildOutcome::DryRun { units } => println!("dry run: {units} units rendered"),
            }
            Ok(ExitStatus::Success)
        }

        Command::Check { batch } => {
            let provider = Arc::new(OpenAiBatchProvider::new(&config.provider)?);
            let monitor = BatchMonitor::new(store, provider, retry);
            let reports = monitor.poll(batch).await?;
            if reports.is_empty() {
                println!("no batches in flight");
                return Ok(ExitStatus::NoWork);
            }
            for report in &reports {
                println!(
                    "batch {} ({}): {} completed={} failed={} total={}{}{}",
                    report.batch_id,
                    report.provider.external_id,
                    report.provider.raw_status,
                    report.provider.counts.completed,
                    report.provider.counts.failed,
                    report.provider.counts.total,
                    report
                        .rate
                        .map(|r| format!(" ({:.2}/s)", r.per_second))
                        .unwrap_or_default(),
                    report
                        .eta_seconds
                        .map(|s| format!(" eta {}s", s.round() as u64))
                        .unwrap_or_default()
                );
                for error in &report.provider.errors {
                    println!("    - {error}");
                }
            }
            if reports.iter().any(|r| r.is_ready()) {
                Ok(ExitStatus::Success)
            } else {
                Ok(ExitStatus::WorkRemains)
            }
        }

        Command::Monitor { batch, interval } => {
            let provider = Arc::new(OpenAiBatchProvider::new(&config.provider)?);
            let monitor = BatchMonitor::new(store, provider, retry);
            let interval = interval
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.poll_interval());
            let outcome = monitor
                .run(batch, interval, shutdown::listen_for_signals())
                .await?;
            println!("monitor finished: {outcome:?}");
            Ok(match outcome {
                MonitorOutcome::TargetCompleted | MonitorOutcome::AllSettled => ExitStatus::Success,
                MonitorOutcome::TargetErrored => ExitStatus::Fatal,
                MonitorOutcome::Interrupted => ExitStatus::WorkRemains,
            })
        }

        Command::Fetch => {
            let provider = Arc::new(OpenAiBatchProvider::new(&config.provider)?);
            let fetcher = BatchFetcher::new(store, provider, retry);
            let summary = fetcher.drain_completed().await?;
            println!(
                "drained {} batches: {} units resolved, {} prompt tokens, {} completion tokens, {} skipped",
                summary.batches,
                summary.units_resolved,
                summary.prompt_tokens,
                summary.completion_tokens,
                summary.skipped
            );
            if summary.errored > 0 {
                println!(
                    "{} drained batches had failed at the provider; their unanswered units are eligible again",
                    summary.errored
                );
            }
            if summary.in_flight > 0 {
                println!("{} batches still in flight", summary.in_flight);
                Ok(ExitStatus::WorkRemains)
            } else {
                Ok(ExitStatus::Success)
            }
        }

        Command::Reconcile { threshold } => {
            let threshold = threshold
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.orphan_threshold());
            let report = Reconciler::new(store, threshold).check().await?;
            for orphan in &report.orphaned {
                println!(
                    "orphaned batch {} created {} with {} assignments",
                    orphan.batch_id, orphan.created_at, orphan.assignments
                );
            }
            for (unit_id, batches) in &report.double_assigned {
                println!("unit {unit_id} assigned to {batches} open batches");
            }
            if report.recent_unsent > 0 {
                println!("{} recent unsent batches (below threshold)", report.recent_unsent);
            }
            if report.needs_attention() {
                Ok(ExitStatus::Alert)
            } else {
                println!("store is consistent");
                Ok(ExitStatus::Success)
            }
        }
    }
}

/// Stands in for the provider in dry runs, which never submit.
struct DryRunProvider;

#[async_trait::async_trait]
impl BatchProvider for DryRunProvider {
    async fn upload(&self, _payload: Vec<u8>) -> sensebatch_core::Result<String> {
        Err(SenseError::InvalidState("dry run does not upload".into()))
    }

    async fn create_batch(
        &self,
        _file_id: &str,
        _metadata: &SubmitMetadata,
    ) -> sensebatch_core::Result<String> {
        Err(SenseError::InvalidState("dry run does not submit".into()))
    }

    async fn status(&self, external_id: &str) -> sensebatch_core::Result<ProviderBatch> {
        Err(SenseError::NotFound(format!("dry run has no batch {external_id}")))
    }

    async fn download(&self, file_id: &str) -> sensebatch_core::Result<String> {
        Err(SenseError::NotFound(format!("dry run has no file {file_id}")))
    }
}
