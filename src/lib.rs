#![deny(missing_docs)]

//! Core library for docsift: document ingestion with deduplication and cascading retrieval
//! over a vector index, a keyword index, and the original sources.

/// Fixed-size word windows and deterministic chunk ids.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Source text storage and the live scan tier.
pub mod corpus;
/// Exact and near-duplicate detection at ingestion.
pub mod dedup;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Wiring of configured backends into the engine.
pub mod engine;
/// Content and filename fingerprints.
pub mod hashing;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and retrieval counters.
pub mod metrics;
/// Domain records shared across components.
pub mod model;
/// Document ingestion pipeline.
pub mod pipeline;
/// Document deletion across every store.
pub mod purge;
/// Qdrant vector store integration.
pub mod qdrant;
/// Cascading retrieval across the three tiers.
pub mod retrieval;
/// Exponential backoff for store writes.
pub mod retry;
/// SQLite document records and FTS5 keyword index.
pub mod sqlite;
/// Storage capability traits and in-memory implementations.
pub mod store;
