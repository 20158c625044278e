//! Router construction for the work queue server.

use axum::{
    routing::{get, post},
    Extension, Router,
};
use sensebatch_core::WorkStore;
use tower_http::trace::TraceLayer;

use crate::handlers;

pub fn build_router(store: WorkStore) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/unresolved", get(handlers::units::unresolved))
        .route("/sentence", get(handlers::units::sentence))
        .route("/synsets", get(handlers::units::synsets))
        .route("/update", post(handlers::units::update))
        .layer(Extension(store))
        .layer(TraceLayer::new_for_http())
}
