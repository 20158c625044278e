//! Where a worker gets its units and sends its answers.
//!
//! `QueueClient` talks to a sensebatch-server; `StoreSource` works on the
//! store directly. The worker loop is the same for both.

mod direct;
mod http;

pub use direct::StoreSource;
pub use http::QueueClient;

use async_trait::async_trait;
use sensebatch_core::types::{CandidateSense, PendingUnit, Resolution, SentenceId, ShardSpec, UnitId};
use sensebatch_core::Result;

#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Up to `limit` eligible units, in unit id order.
    async fn unresolved(&self, shard: Option<ShardSpec>, limit: u32) -> Result<Vec<PendingUnit>>;

    async fn sentence(&self, sentence_id: SentenceId) -> Result<String>;

    async fn senses(&self, unit_id: UnitId) -> Result<Vec<CandidateSense>>;

    async fn submit(&self, resolution: &Resolution) -> Result<()>;
}
