//! Batch Builder: selects eligible units, packages them, opens a batch and
//! submits it.
//!
//! Sequence for one run:
//!
//! 1. select eligible units (optionally one shard)
//! 2. render one NDJSON request line per unit
//! 3. commit the batch row and its assignments (one transaction)
//! 4. submit the payload to the provider (no transaction held)
//! 5. `mark_sent` with the provider's correlation id
//!
//! A crash between 3 and 5 leaves an open batch that was never sent. That
//! state is reported by reconciliation and never resubmitted automatically.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, SenseError};
use crate::prompt::{OptionSet, SensePrompt};
use crate::provider::wire::{BatchRequestLine, ChatRequest};
use crate::provider::{BatchProvider, SubmitMetadata};
use crate::retry::RetryPolicy;
use crate::store::WorkStore;
use crate::types::{BatchId, PendingUnit, ShardSpec, UnitId};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Also write the payload here.
    pub payload_path: Option<PathBuf>,
    /// Render the payload without opening or submitting a batch.
    pub dry_run: bool,
    /// Free text attached to the provider batch.
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Submitted {
        batch_id: BatchId,
        external_id: String,
        units: usize,
    },
    DryRun {
        units: usize,
    },
}

/// The rendered submission for a set of units.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub unit_ids: Vec<UnitId>,
    pub ndjson: String,
}

pub struct BatchBuilder {
    store: WorkStore,
    provider: Arc<dyn BatchProvider>,
    model: String,
    retry: RetryPolicy,
}

impl BatchBuilder {
    pub fn new(
        store: WorkStore,
        provider: Arc<dyn BatchProvider>,
        model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            model: model.into(),
            retry,
        }
    }

    /// Build one batch from the eligible units and submit it.
    ///
    /// Fails with [`SenseError::NoWork`] when nothing is eligible; no batch
    /// row is created in that case.
    pub async fn build_and_submit(
        &self,
        shard: Option<ShardSpec>,
        limit: Option<u32>,
        options: &BuildOptions,
    ) -> Result<BuildOutcome> {
        let selected = self.store.select_eligible_units(shard, limit).await?;
        if selected.is_empty() {
            tracing::info!(shard = ?shard.map(|s| s.to_string()), "No eligible units");
            return Err(SenseError::NoWork);
        }

        let payload = self.render(&selected).await?;
        if payload.unit_ids.is_empty() {
            return Err(SenseError::NoWork);
        }

        if let Some(path) = &options.payload_path {
            tokio::fs::write(path, payload.ndjson.as_bytes())
                .await
                .map_err(|e| {
                    SenseError::Configuration(format!("writing payload {}: {e}", path.display()))
                })?;
            tracing::info!(path = %path.display(), units = payload.unit_ids.len(), "Wrote payload");
        }

        if options.dry_run {
            return Ok(BuildOutcome::DryRun {
                units: payload.unit_ids.len(),
            });
        }

        let batch_id = self
            .store
            .open_batch_with_assignments(&payload.unit_ids)
            .await?;

        let metadata = SubmitMetadata {
            local_batch_id: batch_id,
            description: options
                .description
                .clone()
                .unwrap_or_else(|| match shard {
                    Some(shard) => format!("sense batch {batch_id} (shard {shard})"),
                    None => format!("sense batch {batch_id}"),
                }),
        };

        let bytes = payload.ndjson.into_bytes();
        let file_id = match self
            .retry
            .run("upload payload", || self.provider.upload(bytes.clone()))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    batch_id,
                    error = %e,
                    "Upload failed; batch is open but unsent and needs reconciliation"
                );
                return Err(e);
            }
        };
        tracing::debug!(batch_id, file_id = %file_id, "Uploaded batch payload");

        // Creation runs once. A lost response may still have created the
        // provider-side batch, which reconciliation finds by its metadata.
        let external_id = match self.provider.create_batch(&file_id, &metadata).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    batch_id,
                    file_id = %file_id,
                    error = %e,
                    "Batch creation failed; batch is open but unsent and needs reconciliation"
                );
                return Err(e);
            }
        };

        self.store.mark_sent(batch_id, &external_id).await?;

        tracing::info!(
            batch_id,
            external_id = %external_id,
            units = payload.unit_ids.len(),
            "Submitted batch"
        );

        Ok(BuildOutcome::Submitted {
            batch_id,
            external_id,
            units: payload.unit_ids.len(),
        })
    }

    /// Render the request lines. Units whose sentence has gone missing are
    /// left out and stay eligible.
    pub async fn render(&self, units: &[PendingUnit]) -> Result<Payload> {
        let mut payload = Payload::default();

        for unit in units {
            let Some(sentence) = self.store.sentence(unit.sentence_id).await? else {
                tracing::warn!(
                    unit_id = unit.unit_id,
                    sentence_id = unit.sentence_id,
                    "Sentence missing, unit skipped"
                );
                continue;
            };

            let options = OptionSet::from_candidates(self.store.candidate_senses(unit.unit_id).await?);
            if options.fallback {
                tracing::debug!(unit_id = unit.unit_id, "No stored senses, offering categories");
            }

            let prompt = SensePrompt::new(&sentence, &unit.text, unit.position, options);
            let line = BatchRequestLine::new(unit.unit_id, ChatRequest::forced_tool(&self.model, &prompt));
            let encoded = serde_json::to_string(&line)
                .map_err(|e| SenseError::Internal(anyhow::anyhow!("encoding request line: {e}")))?;

            payload.ndjson.push_str(&encoded);
            payload.ndjson.push('\n');
            payload.unit_ids.push(unit.unit_id);
        }

        Ok(payload)
    }
}
