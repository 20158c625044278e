use axum::{Extension, Json};
use sensebatch_core::queue::HealthResponse;
use sensebatch_core::WorkStore;

use crate::error::AppError;

/// GET /health - liveness plus the unresolved count
pub async fn health(
    Extension(store): Extension<WorkStore>,
) -> Result<Json<HealthResponse>, AppError> {
    let unresolved = store.count_unresolved().await?;
    Ok(Json(HealthResponse {
        status: "ok".into(),
        unresolved,
    }))
}
