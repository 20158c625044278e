//! Work queue protocol shared by the queue server and its workers.
//!
//! | Method | Path          | Query / body                    | Response            |
//! |--------|---------------|---------------------------------|---------------------|
//! | GET    | `/unresolved` | `congruent`, `modulo`, `limit`  | `[PendingUnit]`     |
//! | GET    | `/sentence`   | `sentence_id`                   | `SentenceResponse`  |
//! | GET    | `/synsets`    | `unit_id`                       | `[CandidateSense]`  |
//! | POST   | `/update`     | `UpdateRequest`                 | `UpdateResponse`    |
//! | GET    | `/health`     |                                 | `HealthResponse`    |
//!
//! Errors are 4xx/5xx with an [`ErrorBody`].

use serde::{Deserialize, Serialize};

use crate::types::{Resolution, SentenceId, TokenUsage, UnitId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congruent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SentenceQuery {
    #[serde(default)]
    pub sentence_id: Option<SentenceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceResponse {
    pub sentence: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SynsetsQuery {
    #[serde(default)]
    pub unit_id: Option<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub unit_id: UnitId,
    pub label: String,
    /// Model or tool that produced the label.
    pub source: String,
    #[serde(default)]
    pub compute_time: Option<f64>,
    /// Token counters, when the engine reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl From<UpdateRequest> for Resolution {
    fn from(update: UpdateRequest) -> Self {
        Resolution {
            unit_id: update.unit_id,
            label: update.label,
            source: update.source,
            compute_time: update.compute_time,
            usage: update.usage,
        }
    }
}

impl From<&Resolution> for UpdateRequest {
    fn from(resolution: &Resolution) -> Self {
        UpdateRequest {
            unit_id: resolution.unit_id,
            label: resolution.label.clone(),
            source: resolution.source.clone(),
            compute_time: resolution.compute_time,
            usage: resolution.usage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub unresolved: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
