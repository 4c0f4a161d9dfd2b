//! Qdrant-backed [`VectorIndex`](crate::store::VectorIndex).

pub mod client;
pub mod index;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use index::QdrantVectorIndex;
pub use types::{QdrantError, ScoredPoint};
