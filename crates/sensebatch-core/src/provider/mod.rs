//! Bulk inference provider seam.
//!
//! The builder, monitor and fetcher talk to the provider only through
//! [`BatchProvider`], so tests drive the whole lifecycle with a scripted
//! in-memory provider.

mod openai;
pub mod wire;

pub use openai::OpenAiBatchProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{BatchId, ProviderStatus};

/// Per-request counters as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub completed: i64,
    #[serde(default)]
    pub failed: i64,
}

/// Provider view of one submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBatch {
    pub external_id: String,
    pub status: ProviderStatus,
    /// Status string as sent by the provider, kept for diagnostics.
    pub raw_status: String,
    pub counts: RequestCounts,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    /// Per-item or batch-level diagnostics for the error sub-states.
    pub errors: Vec<String>,
    /// Local batch id echoed back from the submission metadata.
    pub local_batch_id: Option<BatchId>,
}

/// Metadata attached to a submission so that a provider-side batch can be
/// traced back to the store that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitMetadata {
    pub local_batch_id: BatchId,
    pub description: String,
}

#[async_trait]
pub trait BatchProvider: Send + Sync {
    /// Upload an NDJSON payload. Returns the provider's file id. Safe to
    /// repeat: a duplicate upload only leaves an unused file behind.
    async fn upload(&self, payload: Vec<u8>) -> Result<String>;

    /// Create a batch over an uploaded file. Returns the provider's
    /// correlation id. Not idempotent: a lost response can still leave a
    /// provider-side batch, so callers must not repeat it blindly.
    async fn create_batch(&self, file_id: &str, metadata: &SubmitMetadata) -> Result<String>;

    async fn status(&self, external_id: &str) -> Result<ProviderBatch>;

    /// Raw NDJSON content of a result file.
    async fn download(&self, file_id: &str) -> Result<String>;
}
