//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Request bodies are taken as `Result<Json<_>, JsonRejection>` so that every
//! unreadable body is answered with 400 (413 when over the size limit).
//!
//! Store access and graph operations block, so they run through
//! [`with_store`] on a blocking thread holding the store lock.

use super::{
    AppState,
    types::{
        ApiError, HealthResponse, PostResponse, SearchRequest, SearchResponse, ServiceResponse,
        StatusResponse, SubstituteRequest, SubstituteResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use regraft_core::{
    CalculationNode, CalculationStore, Identifier, StoreBackend, Substitution, classify,
    search_calculation,
};

// =============================================================================
// BLOCKING STORE ACCESS
// =============================================================================

/// Run `op` against the store on a blocking thread.
///
/// The write lock is held until `op` returns, so operations never interleave.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut StoreBackend) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let mut store = state.store.clone().write_owned().await;
    tokio::task::spawn_blocking(move || op(&mut store))
        .await
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("store task failed: {e}"),
            )
        })?
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get store status.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = with_store(&state, |store| {
        Ok(StatusResponse {
            calculation_count: store.len()?,
            persistent: store.is_persistent(),
        })
    })
    .await?;
    Ok(Json(status))
}

// =============================================================================
// CALCULATION HANDLERS
// =============================================================================

/// Fetch one calculation.
pub async fn get_calculation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CalculationNode>, ApiError> {
    let id = Identifier::new(id);
    let node = with_store(&state, move |store| Ok(store.fetch_calculation(&id)?)).await?;
    Ok(Json(node))
}

/// Post a calculation.
pub async fn post_calculation_handler(
    State(state): State<AppState>,
    body: Result<Json<CalculationNode>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    let Json(node) = body?;
    let id = with_store(&state, move |store| {
        let id = store.post_calculation(&node)?;
        tracing::debug!(%id, tag = node.tag(), "calculation stored");
        Ok(id)
    })
    .await?;
    Ok(Json(PostResponse { id }))
}

/// Report which service issued an identifier.
pub async fn service_handler(Path(id): Path<String>) -> impl IntoResponse {
    let id = Identifier::new(id);
    let service = classify(&id);
    Json(ServiceResponse { id, service })
}

// =============================================================================
// GRAPH OPERATION HANDLERS
// =============================================================================

/// Substitute one calculation for another under a root.
pub async fn substitute_handler(
    State(state): State<AppState>,
    body: Result<Json<SubstituteRequest>, JsonRejection>,
) -> Result<Json<SubstituteResponse>, ApiError> {
    let Json(request) = body?;
    let outcome = with_store(&state, move |store| {
        Ok(Substitution::new(request.old, request.new).run(store, &request.root)?)
    })
    .await?;
    Ok(Json(outcome.into()))
}

/// Search a graph for function applications.
pub async fn search_handler(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = body?;
    let matches = with_store(&state, move |store| {
        Ok(search_calculation(store, &request.root, &request.needle)?)
    })
    .await?;
    Ok(Json(SearchResponse { matches }))
}
