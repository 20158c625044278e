use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SenseError};

// ─── Scalar aliases ───────────────────────────────────────────

/// Row id of a unit (one word occurrence).
pub type UnitId = i64;

/// Local row id of a batch.
pub type BatchId = i64;

pub type SentenceId = i64;

pub type StoryId = i64;

// ─── Labels ───────────────────────────────────────────────────

/// Catch-all answer offered alongside every candidate set.
pub const OTHER_LABEL: &str = "(other)";

/// Label written at ingestion for units with no candidate sense at all.
pub const NO_SENSE_LABEL: &str = "(none)";

/// Resolving source recorded for units settled at ingestion.
pub const INGEST_SOURCE: &str = "ingest";

/// Offered instead of candidate senses when a unit has none stored.
pub const FALLBACK_CATEGORIES: &[&str] = &[
    "noun",
    "verb",
    "adjective",
    "adverb",
    "pronoun",
    "preposition",
    "conjunction",
    "determiner",
    "interjection",
    "numeral",
    "particle",
    "punctuation",
];

/// Tokens classified as structurally trivial at ingestion. Compared
/// case-insensitively.
pub const TRIVIAL_TOKENS: &[&str] = &[
    "i", "me", "my", "mine", "you", "your", "u", "he", "him", "his", "she", "her", "it", "its",
    "we", "us", "our", "they", "them", "their", "!", ".", "?",
];

pub fn is_trivial_token(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TRIVIAL_TOKENS.contains(&lowered.as_str())
}

// ─── Shards ───────────────────────────────────────────────────

/// Congruence-class partition of the unit space by parent-story id.
///
/// A unit belongs to the shard when `story_id % modulo == congruent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    pub congruent: i64,
    pub modulo: i64,
}

impl ShardSpec {
    pub fn new(congruent: i64, modulo: i64) -> Result<Self> {
        if modulo <= 0 {
            return Err(SenseError::Configuration(format!(
                "shard modulo must be positive, got {modulo}"
            )));
        }
        if congruent < 0 || congruent >= modulo {
            return Err(SenseError::Configuration(format!(
                "shard congruent must be in 0..{modulo}, got {congruent}"
            )));
        }
        Ok(Self { congruent, modulo })
    }

    /// Build from an optional pair. Supplying exactly one half is an error.
    pub fn from_parts(congruent: Option<i64>, modulo: Option<i64>) -> Result<Option<Self>> {
        match (congruent, modulo) {
            (None, None) => Ok(None),
            (Some(c), Some(m)) => Self::new(c, m).map(Some),
            _ => Err(SenseError::Configuration(
                "must specify both congruent and modulo or neither".into(),
            )),
        }
    }
}

impl std::fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} mod {}", self.congruent, self.modulo)
    }
}

// ─── Rows ─────────────────────────────────────────────────────

/// A unit as stored, including resolution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Unit {
    pub id: UnitId,
    pub sentence_id: SentenceId,
    pub position: i64,
    pub text: String,
    pub sense_count: i64,
    pub trivial: bool,
    pub resolved_label: Option<String>,
    pub resolving_source: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub compute_time: Option<f64>,
}

/// An eligible unit with its shard key, as returned by selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingUnit {
    pub unit_id: UnitId,
    pub story_id: StoryId,
    pub sentence_id: SentenceId,
    pub position: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CandidateSense {
    pub label: String,
    pub description: String,
    pub example: Option<String>,
}

impl CandidateSense {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            example: None,
        }
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Batch {
    pub id: BatchId,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub retrieved_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Local lifecycle stage, derived from the timestamps.
    ///
    /// `CompletedObserved` is not visible here: it depends on the provider
    /// status, see [`BatchState::observe`].
    pub fn state(&self) -> BatchState {
        match (self.sent_at, self.retrieved_at) {
            (_, Some(_)) => BatchState::Retrieved,
            (Some(_), None) => BatchState::Sent,
            (None, None) => BatchState::Open,
        }
    }
}

/// Per-batch state machine: open → sent → completed-observed → retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Open,
    Sent,
    CompletedObserved,
    Retrieved,
}

impl BatchState {
    /// Fold a provider observation into the local state. Only a sent batch
    /// can move to `CompletedObserved`; nothing moves a retrieved batch.
    pub fn observe(self, status: ProviderStatus) -> Self {
        match (self, status) {
            (Self::Sent, ProviderStatus::Completed) => Self::CompletedObserved,
            (state, _) => state,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Sent => "sent",
            Self::CompletedObserved => "completed_observed",
            Self::Retrieved => "retrieved",
        }
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CostRecord {
    pub unit_id: UnitId,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub incurred_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProgressSnapshot {
    pub batch_id: BatchId,
    pub checked_at: DateTime<Utc>,
    pub completed: i64,
    pub failed: i64,
}

impl ProgressSnapshot {
    pub fn processed(&self) -> i64 {
        self.completed + self.failed
    }
}

// ─── Results ──────────────────────────────────────────────────

/// Token counters reported by an inference call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

/// One resolved unit, ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub unit_id: UnitId,
    pub label: String,
    pub source: String,
    pub compute_time: Option<f64>,
    /// When present, a cost row is appended alongside the label.
    pub usage: Option<TokenUsage>,
}

// ─── Provider status ──────────────────────────────────────────

/// Provider-side lifecycle of a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Accepted but not started (`validating`).
    Pending,
    /// Running (`in_progress`, `finalizing`, `cancelling`).
    InProgress,
    Completed,
    /// Terminal failure (`failed`, `expired`, `cancelled`).
    Errored,
}

impl ProviderStatus {
    /// Map the provider's raw status string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "validating" => Self::Pending,
            "in_progress" | "finalizing" | "cancelling" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Errored,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }

    /// Whether the status carries meaningful request counts.
    pub fn reports_progress(&self) -> bool {
        matches!(self, Self::InProgress | Self::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_requires_both_halves() {
        assert!(ShardSpec::from_parts(None, None).unwrap().is_none());
        assert!(matches!(
            ShardSpec::from_parts(Some(1), None),
            Err(SenseError::Configuration(_))
        ));
        assert!(matches!(
            ShardSpec::from_parts(None, Some(4)),
            Err(SenseError::Configuration(_))
        ));
        let shard = ShardSpec::from_parts(Some(1), Some(4)).unwrap().unwrap();
        assert_eq!(shard, ShardSpec { congruent: 1, modulo: 4 });
    }

    #[test]
    fn test_shard_rejects_out_of_range() {
        assert!(ShardSpec::new(0, 0).is_err());
        assert!(ShardSpec::new(4, 4).is_err());
        assert!(ShardSpec::new(-1, 4).is_err());
    }

    #[test]
    fn test_trivial_tokens_case_insensitive() {
        assert!(is_trivial_token("They"));
        assert!(is_trivial_token("?"));
        assert!(!is_trivial_token("bank"));
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(ProviderStatus::parse("validating"), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::parse("finalizing"), ProviderStatus::InProgress);
        assert_eq!(ProviderStatus::parse("cancelling"), ProviderStatus::InProgress);
        assert_eq!(ProviderStatus::parse("cancelled"), ProviderStatus::Errored);
        assert_eq!(ProviderStatus::parse("completed"), ProviderStatus::Completed);
        assert_eq!(ProviderStatus::parse("expired"), ProviderStatus::Errored);
        assert!(ProviderStatus::Completed.reports_progress());
        assert!(!ProviderStatus::Pending.reports_progress());
    }

    #[test]
    fn test_batch_state_machine() {
        let now = Utc::now();
        let mut batch = Batch {
            id: 7,
            external_id: None,
            created_at: now,
            sent_at: None,
            retrieved_at: None,
        };
        assert_eq!(batch.state(), BatchState::Open);
        assert_eq!(
            batch.state().observe(ProviderStatus::Completed),
            BatchState::Open
        );

        batch.external_id = Some("batch_abc".into());
        batch.sent_at = Some(now);
        assert_eq!(batch.state(), BatchState::Sent);
        assert_eq!(
            batch.state().observe(ProviderStatus::InProgress),
            BatchState::Sent
        );
        assert_eq!(
            batch.state().observe(ProviderStatus::Completed),
            BatchState::CompletedObserved
        );

        batch.retrieved_at = Some(now);
        assert_eq!(
            batch.state().observe(ProviderStatus::Completed),
            BatchState::Retrieved
        );
    }
}
