//! Batch Fetcher: drains finished batches exactly once.
//!
//! A completed batch contributes every usable result. A batch that failed,
//! expired or was cancelled contributes whatever partial output it left,
//! and draining it releases the rest of its units back to selection.
//!
//! Every result of one batch, its cost rows and `mark_retrieved` commit in a
//! single transaction. A crash mid-drain rolls all of it back and the next
//! run starts that batch over; applying a label is a full overwrite, so the
//! redo cannot double count. Once `retrieved_at` is set the batch is no
//! longer selected and further runs are no-ops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, SenseError};
use crate::prompt::{parse_answer, OptionSet, TOOL_NAME};
use crate::provider::wire::BatchResultLine;
use crate::provider::BatchProvider;
use crate::retry::RetryPolicy;
use crate::store::WorkStore;
use crate::types::{Batch, BatchId, ProviderStatus, Resolution, UnitId};

/// Resolving source recorded when the result body names no model.
const BATCH_SOURCE: &str = "batch";

/// Resolving source for a batch answer. The suffix keeps batch answers
/// apart from worker answers by the same model.
fn batch_source(model: Option<&str>) -> String {
    match model {
        Some(model) if !model.is_empty() => format!("{model} ({BATCH_SOURCE})"),
        _ => BATCH_SOURCE.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub batches: u64,
    pub units_resolved: u64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    /// Records skipped for a non-success status or a malformed answer.
    pub skipped: u64,
    /// Drained batches that ended in a provider failure.
    pub errored: u64,
    /// Sent batches the provider has not finished.
    pub in_flight: u64,
}

pub struct BatchFetcher {
    store: WorkStore,
    provider: Arc<dyn BatchProvider>,
    retry: RetryPolicy,
}

impl BatchFetcher {
    pub fn new(store: WorkStore, provider: Arc<dyn BatchProvider>, retry: RetryPolicy) -> Self {
        Self {
            store,
            provider,
            retry,
        }
    }

    /// Drain every sent, unretrieved batch the provider reports finished.
    pub async fn drain_completed(&self) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();

        for batch in self.store.open_sent_batches().await? {
            let external_id = batch.external_id.as_deref().ok_or_else(|| {
                SenseError::InvalidState(format!("batch {} has no external id", batch.id))
            })?;

            let status = self
                .retry
                .run("batch status", || self.provider.status(external_id))
                .await?;
            let errored = match status.status {
                ProviderStatus::Completed => false,
                ProviderStatus::Errored => true,
                _ => {
                    tracing::debug!(batch_id = batch.id, status = %status.raw_status, "Not ready");
                    summary.in_flight += 1;
                    continue;
                }
            };

            let content = match status.output_file_id.as_deref() {
                Some(file_id) => {
                    self.retry
                        .run("download results", || self.provider.download(file_id))
                        .await?
                }
                None => String::new(),
            };
            if errored {
                tracing::warn!(
                    batch_id = batch.id,
                    external_id,
                    status = %status.raw_status,
                    errors = ?status.errors,
                    partial_output = status.output_file_id.is_some(),
                    "Draining failed batch; unanswered units return to selection"
                );
            } else if status.output_file_id.is_none() {
                tracing::warn!(
                    batch_id = batch.id,
                    error_file_id = ?status.error_file_id,
                    "Completed batch has no output file; all its units stay eligible"
                );
            }

            let (resolutions, skipped) = self.parse_results(&batch, &content).await?;
            summary.skipped += skipped;

            match self.store.drain_batch(batch.id, &resolutions).await {
                Ok(totals) => {
                    summary.batches += 1;
                    summary.errored += u64::from(errored);
                    summary.units_resolved += totals.units_resolved;
                    summary.prompt_tokens += totals.usage.prompt_tokens;
                    summary.completion_tokens += totals.usage.completion_tokens;
                }
                Err(SenseError::InvalidState(reason)) => {
                    // Another fetcher got there first; its transaction won.
                    tracing::info!(batch_id = batch.id, reason = %reason, "Batch already drained");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            batches = summary.batches,
            units_resolved = summary.units_resolved,
            prompt_tokens = summary.prompt_tokens,
            completion_tokens = summary.completion_tokens,
            skipped = summary.skipped,
            errored = summary.errored,
            in_flight = summary.in_flight,
            "Drain finished"
        );
        Ok(summary)
    }

    /// Turn the result file into resolutions, keeping only well-formed,
    /// successful answers for units assigned to this batch.
    async fn parse_results(&self, batch: &Batch, content: &str) -> Result<(Vec<Resolution>, u64)> {
        let assigned: HashSet<UnitId> = self.store.assignments(batch.id).await?.into_iter().collect();
        let mut options_cache: HashMap<UnitId, OptionSet> = HashMap::new();
        let mut resolutions = Vec::new();
        let mut skipped = 0u64;

        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match self
                .parse_line(batch.id, line, &assigned, &mut options_cache)
                .await
            {
                Ok(resolution) => resolutions.push(resolution),
                Err(SenseError::MalformedResponse(reason)) => {
                    tracing::warn!(batch_id = batch.id, line = line_no + 1, reason = %reason, "Result skipped");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((resolutions, skipped))
    }

    async fn parse_line(
        &self,
        batch_id: BatchId,
        line: &str,
        assigned: &HashSet<UnitId>,
        options_cache: &mut HashMap<UnitId, OptionSet>,
    ) -> Result<Resolution> {
        let record: BatchResultLine = serde_json::from_str(line)
            .map_err(|e| SenseError::MalformedResponse(format!("unparseable record: {e}")))?;

        let unit_id = record
            .unit_id()
            .filter(|id| assigned.contains(id))
            .ok_or_else(|| {
                SenseError::MalformedResponse(format!(
                    "custom_id {:?} is not assigned to batch {batch_id}",
                    record.custom_id
                ))
            })?;

        let response = record.response.ok_or_else(|| {
            SenseError::MalformedResponse(format!("unit {unit_id}: no response, error {:?}", record.error))
        })?;
        if response.status_code != 200 {
            return Err(SenseError::MalformedResponse(format!(
                "unit {unit_id}: status {}",
                response.status_code
            )));
        }
        let body = response
            .body
            .ok_or_else(|| SenseError::MalformedResponse(format!("unit {unit_id}: empty body")))?;

        let arguments = body.tool_arguments(TOOL_NAME).ok_or_else(|| {
            SenseError::MalformedResponse(format!("unit {unit_id}: no {TOOL_NAME} call"))
        })?;

        if !options_cache.contains_key(&unit_id) {
            let candidates = self.store.candidate_senses(unit_id).await?;
            options_cache.insert(unit_id, OptionSet::from_candidates(candidates));
        }
        let options = &options_cache[&unit_id];
        let label = parse_answer(arguments, options)
            .map_err(|e| SenseError::MalformedResponse(format!("unit {unit_id}: {e}")))?;

        Ok(Resolution {
            unit_id,
            label,
            source: batch_source(body.model.as_deref()),
            compute_time: None,
            usage: Some(body.usage.clone().unwrap_or_default().into()),
        })
    }
}
