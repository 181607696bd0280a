//! Vellum - RAG backbone
//!
//! Two cooperating pipelines over a vector store: ingestion (extraction,
//! chunking, parallel embedding, image description, summary generation)
//! and search (three strategies of increasing precision, up to LLM-driven
//! document selection with metadata-derived filters).

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod search;
pub mod store;
pub mod types;

pub use error::{Result, VellumError};
pub use ingest::{document_id, IngestOptions, IngestOutcome, IngestionPipeline};
pub use search::{build_strategy, SearchQuery, StrategyKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
