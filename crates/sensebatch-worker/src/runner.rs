//! The worker loop: pull a page, answer each unit, submit, repeat until
//! the source has nothing left.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use sensebatch_core::prompt::{OptionSet, SensePrompt};
use sensebatch_core::shutdown;
use sensebatch_core::types::{PendingUnit, Resolution, ShardSpec, TokenUsage, UnitId};
use sensebatch_core::{ExitStatus, Result, RetryPolicy, SenseError};

use crate::engine::InferenceEngine;
use crate::source::WorkSource;

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub shard: Option<ShardSpec>,
    /// Units requested per `unresolved` call.
    pub page_size: u32,
    /// Stop once this many units are resolved. Skipped units do not count.
    pub limit: Option<u32>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            shard: None,
            page_size: 50,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The source returned no unit this run has not already tried.
    Exhausted,
    LimitReached,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub outcome: WorkerOutcome,
    pub resolved: u64,
    /// Units left unresolved because no acceptable answer came back.
    pub skipped: Vec<UnitId>,
    pub usage: TokenUsage,
}

impl WorkerSummary {
    pub fn exit_status(&self) -> ExitStatus {
        match self.outcome {
            WorkerOutcome::Exhausted if self.skipped.is_empty() => ExitStatus::Success,
            _ => ExitStatus::WorkRemains,
        }
    }
}

pub struct Worker {
    source: Arc<dyn WorkSource>,
    engine: Arc<dyn InferenceEngine>,
    retry: RetryPolicy,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(
        source: Arc<dyn WorkSource>,
        engine: Arc<dyn InferenceEngine>,
        retry: RetryPolicy,
        options: WorkerOptions,
    ) -> Self {
        Self {
            source,
            engine,
            retry,
            options,
        }
    }

    /// Run until the source is exhausted, the limit is reached, or
    /// `shutdown_rx` flips. Interrupts are honoured between units only.
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> Result<WorkerSummary> {
        let mut summary = WorkerSummary {
            outcome: WorkerOutcome::Exhausted,
            resolved: 0,
            skipped: Vec::new(),
            usage: TokenUsage::default(),
        };
        let mut tried: HashSet<UnitId> = HashSet::new();
        let page_size = self.options.page_size.max(1);

        loop {
            let resolved = u32::try_from(summary.resolved).unwrap_or(u32::MAX);
            let remaining = self.options.limit.map(|l| l.saturating_sub(resolved));
            if remaining == Some(0) {
                summary.outcome = WorkerOutcome::LimitReached;
                break;
            }
            let wanted = remaining.map_or(page_size, |r| r.min(page_size));

            // Skipped units stay eligible; ask for enough to see past them.
            let page = self
                .source
                .unresolved(self.options.shard, wanted + summary.skipped.len() as u32)
                .await?;
            let fresh: Vec<PendingUnit> = page
                .into_iter()
                .filter(|u| !tried.contains(&u.unit_id))
                .take(wanted as usize)
                .collect();
            if fresh.is_empty() {
                summary.outcome = WorkerOutcome::Exhausted;
                break;
            }

            for unit in &fresh {
                if shutdown::requested(&shutdown_rx) {
                    summary.outcome = WorkerOutcome::Interrupted;
                    return Ok(self.finish(summary));
                }
                tried.insert(unit.unit_id);

                match self.answer(unit).await {
                    Ok(resolution) => {
                        self.source.submit(&resolution).await?;
                        if let Some(usage) = resolution.usage {
                            summary.usage += usage;
                        }
                        summary.resolved += 1;
                        tracing::info!(
                            unit_id = unit.unit_id,
                            word = %unit.text,
                            label = %resolution.label,
                            compute_time = ?resolution.compute_time,
                            "Unit resolved"
                        );
                    }
                    Err(SenseError::MalformedResponse(reason)) => {
                        tracing::warn!(
                            unit_id = unit.unit_id,
                            %reason,
                            "No acceptable answer, leaving unit unresolved"
                        );
                        summary.skipped.push(unit.unit_id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(self.finish(summary))
    }

    fn finish(&self, summary: WorkerSummary) -> WorkerSummary {
        tracing::info!(
            outcome = ?summary.outcome,
            resolved = summary.resolved,
            skipped = summary.skipped.len(),
            prompt_tokens = summary.usage.prompt_tokens,
            completion_tokens = summary.usage.completion_tokens,
            "Worker finished"
        );
        summary
    }

    /// Fetch context, prompt the engine, and time the inference.
    async fn answer(&self, unit: &PendingUnit) -> Result<Resolution> {
        let sentence = self.source.sentence(unit.sentence_id).await?;
        let senses = self.source.senses(unit.unit_id).await?;
        let prompt = SensePrompt::new(
            &sentence,
            &unit.text,
            unit.position,
            OptionSet::from_candidates(senses),
        );
        tracing::debug!(unit_id = unit.unit_id, prompt = %prompt.text, "Prompting");

        let started = Instant::now();
        let inference = self
            .retry
            .run("inference", || self.engine.infer(&prompt))
            .await?;
        let compute_time = started.elapsed().as_secs_f64();

        Ok(Resolution {
            unit_id: unit.unit_id,
            label: inference.label,
            source: self.engine.model().to_string(),
            compute_time: Some(compute_time),
            usage: inference.usage,
        })
    }
}
