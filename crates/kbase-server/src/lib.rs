//! kbase server: axum routes over the runtime orchestrator.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{build_router, TENANT_HEADER};
pub use state::AppState;
