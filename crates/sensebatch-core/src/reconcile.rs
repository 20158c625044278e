//! Reconciliation: reports store states that no component repairs on its
//! own. Nothing here resubmits or rewrites a batch.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::error::{Result, SenseError};
use crate::store::WorkStore;
use crate::types::{BatchId, UnitId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanReport {
    pub batch_id: BatchId,
    pub created_at: chrono::DateTime<Utc>,
    pub assignments: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Open batches with assignments, never sent, older than the threshold.
    pub orphaned: Vec<OrphanReport>,
    /// Units currently assigned to more than one unretrieved batch.
    pub double_assigned: Vec<(UnitId, i64)>,
    /// Unsent batches younger than the threshold; possibly still submitting.
    pub recent_unsent: usize,
}

impl ReconcileReport {
    pub fn needs_attention(&self) -> bool {
        !self.orphaned.is_empty() || !self.double_assigned.is_empty()
    }

    /// The alert for the oldest orphan, if any.
    pub fn first_alert(&self) -> Option<SenseError> {
        self.orphaned.first().map(|o| SenseError::OrphanedBatch {
            batch_id: o.batch_id,
            created_at: o.created_at,
        })
    }
}

pub struct Reconciler {
    store: WorkStore,
    threshold: Duration,
}

impl Reconciler {
    pub fn new(store: WorkStore, threshold: Duration) -> Self {
        Self { store, threshold }
    }

    pub async fn check(&self) -> Result<ReconcileReport> {
        let threshold = chrono::Duration::from_std(self.threshold)
            .map_err(|e| SenseError::Configuration(format!("orphan threshold: {e}")))?;
        let cutoff = Utc::now() - threshold;

        let mut report = ReconcileReport::default();
        for unsent in self.store.unsent_batches().await? {
            if unsent.assignment_count == 0 {
                continue;
            }
            if unsent.batch.created_at <= cutoff {
                tracing::error!(
                    batch_id = unsent.batch.id,
                    created_at = %unsent.batch.created_at,
                    assignments = unsent.assignment_count,
                    "Orphaned batch: committed but never sent"
                );
                report.orphaned.push(OrphanReport {
                    batch_id: unsent.batch.id,
                    created_at: unsent.batch.created_at,
                    assignments: unsent.assignment_count,
                });
            } else {
                report.recent_unsent += 1;
            }
        }

        report.double_assigned = self.store.double_assigned_units().await?;
        for (unit_id, open_batches) in &report.double_assigned {
            tracing::error!(unit_id, open_batches, "Unit assigned to several open batches");
        }

        Ok(report)
    }
}
