//! Error taxonomy and the process exit-code convention.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::BatchId;

pub type Result<T> = std::result::Result<T, SenseError>;

#[derive(Debug, Error)]
pub enum SenseError {
    /// Fatal, reported before any work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Nothing eligible. Not a failure.
    #[error("no eligible units")]
    NoWork,

    /// Provider or server unreachable or timed out. Retried with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Missing field, or a stream that never yields a valid answer.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Batch committed locally but never sent.
    #[error("orphaned batch {batch_id} (created {created_at}, never sent)")]
    OrphanedBatch {
        batch_id: BatchId,
        created_at: DateTime<Utc>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Non-retriable rejection from the provider or queue server.
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A lifecycle transition was refused by the store.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SenseError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Configuration(_) => ExitStatus::Configuration,
            Self::NoWork => ExitStatus::NoWork,
            Self::OrphanedBatch { .. } => ExitStatus::Alert,
            _ => ExitStatus::Fatal,
        }
    }

    /// Classify a transport failure. Connection problems, timeouts and 5xx
    /// answers are transient; everything else is not.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            return Self::TransientNetwork(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() => Self::TransientNetwork(err.to_string()),
            Some(status) => Self::Rejected {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None if err.is_decode() => Self::MalformedResponse(err.to_string()),
            None => Self::TransientNetwork(err.to_string()),
        }
    }

    /// Classify a non-success HTTP status with its body.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::TransientNetwork(format!("{status}: {body}"))
        } else {
            Self::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Process exit codes shared by every binary.
///
/// "Ran to completion, nothing pending" and "ran to completion, work
/// remains" are distinct codes so that scripts can loop on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Fatal,
    Configuration,
    WorkRemains,
    NoWork,
    Alert,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Fatal => 1,
            Self::Configuration => 2,
            Self::WorkRemains => 3,
            Self::NoWork => 4,
            Self::Alert => 5,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(
            SenseError::Configuration("x".into()).exit_status(),
            ExitStatus::Configuration
        );
        assert_eq!(SenseError::NoWork.exit_status(), ExitStatus::NoWork);
        assert_eq!(
            SenseError::OrphanedBatch {
                batch_id: 3,
                created_at: Utc::now()
            }
            .exit_status(),
            ExitStatus::Alert
        );
        assert_eq!(
            SenseError::TransientNetwork("down".into()).exit_status(),
            ExitStatus::Fatal
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let all = [
            ExitStatus::Success,
            ExitStatus::Fatal,
            ExitStatus::Configuration,
            ExitStatus::WorkRemains,
            ExitStatus::NoWork,
            ExitStatus::Alert,
        ];
        let mut codes: Vec<u8> = all.iter().map(|s| s.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_status_classification() {
        let busy = SenseError::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, "".into());
        assert!(busy.is_transient());
        let limited = SenseError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "".into());
        assert!(limited.is_transient());
        let bad = SenseError::from_status(reqwest::StatusCode::BAD_REQUEST, "nope".into());
        assert!(matches!(bad, SenseError::Rejected { status: 400, .. }));
    }
}
