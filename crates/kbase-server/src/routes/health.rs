//! Health route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// GET /api/health: service status and store counts.
async fn get_health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.orchestrator.status()?;
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "kbase",
        "port": state.config.port,
        "embedder": status.embedder,
        "embeddingDimension": status.embedding_dim,
        "llm": status.llm,
        "rerankStages": status.rerank_stages,
        "documents": status.documents,
        "chunks": status.chunks,
    })))
}
