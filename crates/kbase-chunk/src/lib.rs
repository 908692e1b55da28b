//! kbase chunk: recursive, semantic and sentence splitting with exact
//! source offsets.

pub mod chunker;
mod recursive;
mod semantic;
mod sentence;
mod spans;

pub use chunker::{ChunkStrategy, Chunker};
