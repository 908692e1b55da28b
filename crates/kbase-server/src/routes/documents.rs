//! Document routes: (re-)index and delete.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};

use kbase_core::Error;
use kbase_runtime::{IngestOutcome, IngestRequest, IngestStatus};

use super::Tenant;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents", post(ingest_document))
        .route("/documents/{id}", delete(delete_document))
}

/// POST /api/documents: 201 when indexed, 200 when the content is unchanged.
async fn ingest_document(
    State(state): State<Arc<AppState>>,
    Tenant(scope): Tenant,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let outcome = state.orchestrator.ingest_document(&scope, req).await?;
    let status = match outcome.status {
        IngestStatus::Indexed => StatusCode::CREATED,
        IngestStatus::Unchanged => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// DELETE /api/documents/{id}
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Tenant(scope): Tenant,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.orchestrator.delete_document(&scope, &id)? {
        return Err(Error::NotFound(format!("document {id}")).into());
    }
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}
