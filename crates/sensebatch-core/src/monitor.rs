//! Batch Monitor: polls the provider and appends progress snapshots.
//!
//! The monitor only reports. It never downloads or applies results; that
//! is the fetcher's job, so "provider says completed" and "retrieved
//! locally" stay separate states.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Result, SenseError};
use crate::provider::{BatchProvider, ProviderBatch};
use crate::retry::RetryPolicy;
use crate::shutdown;
use crate::store::WorkStore;
use crate::throughput::{self, Rate};
use crate::types::{Batch, BatchId, BatchState, ProgressSnapshot, ProviderStatus};

/// Result of polling one batch.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub batch_id: BatchId,
    pub provider: ProviderBatch,
    pub state: BatchState,
    /// Appended when the provider reported counts.
    pub snapshot: Option<ProgressSnapshot>,
    /// Rate over the last two snapshots.
    pub rate: Option<Rate>,
    /// Rate since the first snapshot.
    pub overall: Option<Rate>,
    /// Seconds left at the latest rate.
    pub eta_seconds: Option<f64>,
}

impl PollReport {
    pub fn is_ready(&self) -> bool {
        self.state == BatchState::CompletedObserved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The requested batch was observed completed.
    TargetCompleted,
    /// The requested batch reached an error sub-state.
    TargetErrored,
    /// No target: every open batch is completed or errored (or none exist).
    AllSettled,
    Interrupted,
}

pub struct BatchMonitor {
    store: WorkStore,
    provider: Arc<dyn BatchProvider>,
    retry: RetryPolicy,
}

impl BatchMonitor {
    pub fn new(store: WorkStore, provider: Arc<dyn BatchProvider>, retry: RetryPolicy) -> Self {
        Self {
            store,
            provider,
            retry,
        }
    }

    /// Poll one batch, or every sent and unretrieved batch.
    pub async fn poll(&self, target: Option<BatchId>) -> Result<Vec<PollReport>> {
        let batches = self.batches_to_poll(target).await?;
        let mut reports = Vec::with_capacity(batches.len());
        for batch in &batches {
            reports.push(self.poll_batch(batch).await?);
        }
        Ok(reports)
    }

    /// Poll at `interval` until the target settles, or until every open
    /// batch has settled. The interrupt is checked between batches.
    pub async fn run(
        &self,
        target: Option<BatchId>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<MonitorOutcome> {
        loop {
            let batches = self.batches_to_poll(target).await?;
            let mut settled = 0usize;

            for batch in &batches {
                if shutdown::requested(&shutdown_rx) {
                    return Ok(MonitorOutcome::Interrupted);
                }
                let report = self.poll_batch(batch).await?;
                match (target, report.provider.status) {
                    (Some(_), ProviderStatus::Completed) => {
                        return Ok(MonitorOutcome::TargetCompleted)
                    }
                    (Some(_), ProviderStatus::Errored) => return Ok(MonitorOutcome::TargetErrored),
                    (None, status) if status.is_terminal() => settled += 1,
                    _ => {}
                }
            }

            if target.is_none() && settled == batches.len() {
                tracing::info!(batches = batches.len(), "All open batches settled");
                return Ok(MonitorOutcome::AllSettled);
            }

            if shutdown::sleep_or_shutdown(interval, &mut shutdown_rx).await {
                return Ok(MonitorOutcome::Interrupted);
            }
        }
    }

    async fn batches_to_poll(&self, target: Option<BatchId>) -> Result<Vec<Batch>> {
        let Some(batch_id) = target else {
            return self.store.open_sent_batches().await;
        };
        let batch = self
            .store
            .batch(batch_id)
            .await?
            .ok_or_else(|| SenseError::NotFound(format!("batch {batch_id}")))?;
        match batch.state() {
            BatchState::Sent => Ok(vec![batch]),
            state => Err(SenseError::InvalidState(format!(
                "batch {batch_id} is {state}, only sent batches can be polled"
            ))),
        }
    }

    async fn poll_batch(&self, batch: &Batch) -> Result<PollReport> {
        let external_id = batch.external_id.as_deref().ok_or_else(|| {
            SenseError::InvalidState(format!("batch {} has no external id", batch.id))
        })?;

        let provider = self
            .retry
            .run("poll batch", || self.provider.status(external_id))
            .await?;

        if let Some(echoed) = provider.local_batch_id {
            if echoed != batch.id {
                tracing::warn!(
                    batch_id = batch.id,
                    echoed,
                    external_id,
                    "Provider batch was submitted from a different store"
                );
            }
        }

        let mut snapshot = None;
        let mut rate = None;
        let mut overall = None;
        let mut eta_seconds = None;
        if provider.status.reports_progress() {
            let recorded = self
                .store
                .record_progress(batch.id, provider.counts.completed, provider.counts.failed)
                .await?;
            let series = self.store.progress_snapshots(batch.id).await?;
            rate = throughput::latest(&series);
            overall = throughput::overall(&series);
            eta_seconds = throughput::eta_seconds(&series, provider.counts.total);
            snapshot = Some(recorded);
        }

        let state = batch.state().observe(provider.status);

        match provider.status {
            ProviderStatus::Errored => {
                tracing::error!(
                    batch_id = batch.id,
                    external_id,
                    status = %provider.raw_status,
                    errors = ?provider.errors,
                    "Batch failed at provider"
                );
            }
            _ => {
                tracing::info!(
                    batch_id = batch.id,
                    external_id,
                    status = %provider.raw_status,
                    total = provider.counts.total,
                    completed = provider.counts.completed,
                    failed = provider.counts.failed,
                    per_second = rate.map(|r| r.per_second),
                    overall_per_second = overall.map(|r| r.per_second),
                    eta_seconds = eta_seconds.map(|s| s.round() as u64),
                    "Polled batch"
                );
                for diagnostic in &provider.errors {
                    tracing::warn!(batch_id = batch.id, diagnostic = %diagnostic, "Provider diagnostic");
                }
            }
        }

        Ok(PollReport {
            batch_id: batch.id,
            provider,
            state,
            snapshot,
            rate,
            overall,
            eta_seconds,
        })
    }
}
