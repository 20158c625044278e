//! sensebatch-server - pull-based work queue over the shared work store.

pub mod error;
pub mod handlers;
pub mod router;
