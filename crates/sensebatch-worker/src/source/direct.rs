use async_trait::async_trait;
use sensebatch_core::types::{CandidateSense, PendingUnit, Resolution, SentenceId, ShardSpec, UnitId};
use sensebatch_core::{Result, SenseError, WorkStore};

use super::WorkSource;

/// Resolves against the work store without a server in between. Costs
/// reported by the engine are appended alongside each label.
#[derive(Clone)]
pub struct StoreSource {
    store: WorkStore,
}

impl StoreSource {
    pub fn new(store: WorkStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WorkSource for StoreSource {
    async fn unresolved(&self, shard: Option<ShardSpec>, limit: u32) -> Result<Vec<PendingUnit>> {
        self.store.select_eligible_units(shard, Some(limit)).await
    }

    async fn sentence(&self, sentence_id: SentenceId) -> Result<String> {
        self.store
            .sentence(sentence_id)
            .await?
            .ok_or_else(|| SenseError::NotFound(format!("sentence {sentence_id}")))
    }

    async fn senses(&self, unit_id: UnitId) -> Result<Vec<CandidateSense>> {
        self.store.candidate_senses(unit_id).await
    }

    async fn submit(&self, resolution: &Resolution) -> Result<()> {
        self.store.resolve(resolution).await
    }
}
