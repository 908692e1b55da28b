//! HTTP route handlers.

pub mod chunk;
pub mod documents;
pub mod health;
pub mod search;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use kbase_core::TenantScope;

use crate::error::ApiError;
use crate::state::AppState;

/// Header naming the organisation a request acts for.
pub const TENANT_HEADER: &str = "x-organisation-id";

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(chunk::routes())
        .merge(documents::routes())
        .merge(search::routes())
}

/// Tenant scope taken from [`TENANT_HEADER`]. Missing or blank is a 400.
pub struct Tenant(pub TenantScope);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("missing {TENANT_HEADER} header")))?;
        Ok(Tenant(TenantScope::new(value)))
    }
}
