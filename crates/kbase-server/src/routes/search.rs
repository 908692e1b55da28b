//! Search and ask routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use kbase_runtime::{AskRequest, AskResponse, SearchRequest, SearchResponse};

use super::Tenant;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", post(search))
        .route("/ask", post(ask))
}

/// POST /api/search: retrieve, then rerank.
async fn search(
    State(state): State<Arc<AppState>>,
    Tenant(scope): Tenant,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let response = state.orchestrator.search(&scope, &req).await?;
    Ok(Json(response))
}

/// POST /api/ask: search, then answer from the sources.
async fn ask(
    State(state): State<Arc<AppState>>,
    Tenant(scope): Tenant,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let response = state.orchestrator.ask(&scope, &req).await?;
    Ok(Json(response))
}
