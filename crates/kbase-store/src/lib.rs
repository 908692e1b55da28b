//! kbase store: SQLite FTS5 + u8-quantized vector search, scoped per
//! organisation.

pub mod quantize;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::{SqliteStore, FALLBACK_KEYWORD_SCORE};
pub use types::*;
