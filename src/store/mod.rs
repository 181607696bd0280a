//! Vector store abstraction
//!
//! One store handle covers one collection. The ingestion pipeline owns two
//! handles (documents and summaries); partitions inside each collection are
//! named by `file_id` so the search strategies can scope a scan to the
//! documents an LLM selected.
//!
//! Backends:
//! - [`MemoryStore`]: embedded, exact cosine scan, full filter evaluation
//! - [`MilvusStore`]: Milvus REST v2 over HTTP

mod filter;
mod index;
mod memory;
mod milvus;
mod schema;

pub use filter::{CmpOp, FilterExpr, Literal};
pub use index::{IndexKind, DEFAULT_HNSW_EF_CONSTRUCTION, DEFAULT_HNSW_M, DEFAULT_NLIST};
pub use memory::MemoryStore;
pub use milvus::MilvusStore;
pub use schema::{
    schema_for, CollectionSchema, DocumentSchema, FieldKind, FieldSchema, SchemaKind,
    SchemaProvider, SummarySchema, TEXT_MAX_LENGTH, VECTOR_FIELD,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Record;

/// Parameters for a vector similarity search
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub vector: Vec<f32>,
    pub limit: usize,
    /// Partitions to scan; None scans the whole collection
    pub partitions: Option<Vec<String>>,
    /// Rendered filter expression (grammar in [`FilterExpr`])
    pub filter: Option<String>,
}

impl SearchParams {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            partitions: None,
            filter: None,
        }
    }

    pub fn with_partitions(mut self, partitions: Vec<String>) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// A single search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Store-assigned record id
    pub id: i64,
    /// Cosine similarity to the query vector
    pub score: f32,
    /// Output fields of the record
    pub fields: Record,
}

impl SearchHit {
    fn str_field(&self, name: &str) -> &str {
        self.fields.get(name).and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn text(&self) -> &str {
        self.str_field("text")
    }

    pub fn file_id(&self) -> &str {
        self.str_field("file_id")
    }

    pub fn file_name(&self) -> &str {
        self.str_field("file_name")
    }

    pub fn file_type(&self) -> &str {
        self.str_field("file_type")
    }

    pub fn pages(&self) -> &str {
        self.str_field("pages")
    }

    pub fn chapters(&self) -> &str {
        self.str_field("chapters")
    }
}

/// Sort hits by score descending, ties broken by id ascending
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
}

/// A vector store collection handle.
///
/// All "ensure" operations are idempotent with respect to already-existing
/// objects; re-opening a collection never changes its schema.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open or create the collection with the given schema and vector index
    async fn ensure_collection(&self, schema: &CollectionSchema, index: &IndexKind) -> Result<()>;

    /// Open or create a partition
    async fn ensure_partition(&self, partition: &str) -> Result<()>;

    /// Insert fully prepared records into a partition
    async fn insert(&self, records: Vec<Record>, partition: &str) -> Result<usize>;

    /// Vector similarity search (cosine). Results are sorted by score
    /// descending with ties broken by id ascending.
    async fn search(&self, params: SearchParams) -> Result<Vec<SearchHit>>;

    /// Convenience scan of a single partition
    async fn search_by_partition(
        &self,
        vector: &[f32],
        partition: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.search(
            SearchParams::new(vector.to_vec(), limit)
                .with_partitions(vec![partition.to_string()]),
        )
        .await
    }

    /// Every record in the collection (used by the selection phase to build
    /// the document catalog)
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    /// Delete all records with the given `file_id`; returns the number removed
    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize>;

    /// Names of existing partitions
    async fn list_partitions(&self) -> Result<Vec<String>>;

    /// Release the collection and close the connection
    async fn release(&self) -> Result<()>;
}
