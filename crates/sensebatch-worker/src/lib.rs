//! sensebatch-worker: resolves units one at a time, pulling them from the
//! work queue server or straight from the store.

pub mod engine;
pub mod runner;
pub mod source;

pub use engine::{Inference, InferenceEngine};
pub use runner::{Worker, WorkerOptions, WorkerOutcome, WorkerSummary};
pub use source::{QueueClient, StoreSource, WorkSource};
