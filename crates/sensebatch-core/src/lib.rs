//! sensebatch-core: batch work distribution for word-sense disambiguation.
//!
//! Units (ambiguous word occurrences) live in a shared SQLite [`WorkStore`].
//! The [`BatchBuilder`] packages eligible units into provider batches, the
//! [`BatchMonitor`] tracks their progress and the [`BatchFetcher`] drains
//! completed batches back into the store exactly once. The queue server and
//! worker crates build on the same store and prompt for synchronous
//! resolution.

pub mod builder;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod monitor;
pub mod prompt;
pub mod provider;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod shutdown;
pub mod store;
pub mod throughput;
pub mod types;

pub use builder::{BatchBuilder, BuildOptions, BuildOutcome};
pub use config::SenseConfig;
pub use error::{ExitStatus, Result, SenseError};
pub use fetcher::{BatchFetcher, DrainSummary};
pub use monitor::{BatchMonitor, MonitorOutcome, PollReport};
pub use reconcile::{ReconcileReport, Reconciler};
pub use retry::RetryPolicy;
pub use store::WorkStore;
