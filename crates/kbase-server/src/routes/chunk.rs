//! Chunk preview route. Nothing is stored.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use kbase_chunk::ChunkStrategy;
use kbase_core::{ChunkResult, ChunkingOptions};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/chunk", post(chunk_text))
}

#[derive(Deserialize)]
struct ChunkRequest {
    text: String,
    #[serde(default)]
    strategy: ChunkStrategy,
    /// Replaces the configured options when present.
    #[serde(default)]
    options: Option<ChunkingOptions>,
}

/// POST /api/chunk: run a chunking strategy over `text`.
async fn chunk_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<ChunkResult>, ApiError> {
    let result = state.orchestrator.chunk(&req.text, req.strategy, req.options)?;
    Ok(Json(result))
}
