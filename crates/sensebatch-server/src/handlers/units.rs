//! Work queue handlers.
//!
//! GET  /unresolved  - eligible units, optionally one shard
//! GET  /sentence    - enclosing sentence text
//! GET  /synsets     - candidate senses of a unit
//! POST /update      - apply a worker's label
//!
//! Each request runs its own store statements; nothing is cached and no
//! transaction outlives the request.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::{Extension, Json};
use sensebatch_core::prompt::OptionSet;
use sensebatch_core::queue::{
    SentenceQuery, SentenceResponse, SynsetsQuery, UnresolvedQuery, UpdateRequest, UpdateResponse,
};
use sensebatch_core::types::{CandidateSense, PendingUnit, ShardSpec};
use sensebatch_core::WorkStore;

use crate::error::AppError;

/// GET /unresolved - eligible units in unit id order
pub async fn unresolved(
    Extension(store): Extension<WorkStore>,
    query: Result<Query<UnresolvedQuery>, QueryRejection>,
) -> Result<Json<Vec<PendingUnit>>, AppError> {
    let Query(query) = query?;
    let shard = ShardSpec::from_parts(query.congruent, query.modulo)?;
    let units = store.select_eligible_units(shard, query.limit).await?;
    tracing::debug!(count = units.len(), ?shard, "Served unresolved units");
    Ok(Json(units))
}

/// GET /sentence - text of one sentence
pub async fn sentence(
    Extension(store): Extension<WorkStore>,
    query: Result<Query<SentenceQuery>, QueryRejection>,
) -> Result<Json<SentenceResponse>, AppError> {
    let Query(query) = query?;
    let sentence_id = query
        .sentence_id
        .ok_or_else(|| AppError::bad_request("sentence_id is required"))?;
    let sentence = store
        .sentence(sentence_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("sentence {sentence_id} not found")))?;
    Ok(Json(SentenceResponse { sentence }))
}

/// GET /synsets - candidate senses of a unit
pub async fn synsets(
    Extension(store): Extension<WorkStore>,
    query: Result<Query<SynsetsQuery>, QueryRejection>,
) -> Result<Json<Vec<CandidateSense>>, AppError> {
    let Query(query) = query?;
    let unit_id = query
        .unit_id
        .ok_or_else(|| AppError::bad_request("unit_id is required"))?;
    if store.unit(unit_id).await?.is_none() {
        return Err(AppError::not_found(format!("unit {unit_id} not found")));
    }
    Ok(Json(store.candidate_senses(unit_id).await?))
}

/// POST /update - apply a worker's label and optional cost
pub async fn update(
    Extension(store): Extension<WorkStore>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, AppError> {
    let Json(update) = body?;

    if update.label.trim().is_empty() {
        return Err(AppError::bad_request("label must not be empty"));
    }
    if update.source.trim().is_empty() {
        return Err(AppError::bad_request("source must not be empty"));
    }
    if update.compute_time.is_some_and(|t| !t.is_finite() || t < 0.0) {
        return Err(AppError::bad_request("compute_time must be a non-negative number"));
    }
    if store.unit(update.unit_id).await?.is_none() {
        return Err(AppError::not_found(format!("unit {} not found", update.unit_id)));
    }

    let options = OptionSet::from_candidates(store.candidate_senses(update.unit_id).await?);
    if !options.accepts(&update.label) {
        return Err(AppError::bad_request(format!(
            "label {:?} is not an option for unit {}",
            update.label, update.unit_id
        )));
    }

    let unit_id = update.unit_id;
    store.resolve(&update.into()).await?;
    tracing::info!(unit_id, "Unit resolved");

    Ok(Json(UpdateResponse {
        message: "done".into(),
    }))
}
