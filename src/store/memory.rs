//! Embedded in-memory vector store
//!
//! Exact cosine scan with full filter evaluation. Backs the test suite and
//! small local corpora; shares the record layout and ordering guarantees of
//! the remote backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{Result, VellumError};
use crate::store::schema::VECTOR_FIELD;
use crate::store::{
    sort_hits, CollectionSchema, FilterExpr, IndexKind, SearchHit, SearchParams, VectorStore,
};
use crate::types::Record;

#[derive(Debug, Clone)]
struct StoredRecord {
    id: i64,
    vector: Vec<f32>,
    fields: Record,
}

#[derive(Default)]
struct Inner {
    schema: Option<CollectionSchema>,
    index: Option<IndexKind>,
    partitions: BTreeMap<String, Vec<StoredRecord>>,
    next_id: i64,
    released: bool,
}

/// In-memory collection handle
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total record count across partitions
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .partitions
            .values()
            .map(|records| records.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index the collection was created with, if any
    pub fn index(&self) -> Option<IndexKind> {
        self.inner.read().index
    }

    /// Record count in one partition
    pub fn partition_len(&self, partition: &str) -> usize {
        self.inner
            .read()
            .partitions
            .get(partition)
            .map(|records| records.len())
            .unwrap_or(0)
    }

    fn check_open(inner: &Inner) -> Result<()> {
        if inner.released {
            return Err(VellumError::Store("store has been released".to_string()));
        }
        Ok(())
    }

    fn extract_vector(record: &mut Record) -> Result<Vec<f32>> {
        let value = record.remove(VECTOR_FIELD).ok_or_else(|| {
            VellumError::Store(format!("record is missing the '{}' field", VECTOR_FIELD))
        })?;
        let vector: Vec<f32> = value
            .as_array()
            .ok_or_else(|| VellumError::Store(format!("'{}' must be an array", VECTOR_FIELD)))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| VellumError::Store("embedding must be numeric".to_string()))
            })
            .collect::<Result<_>>()?;
        if vector.is_empty() {
            return Err(VellumError::Store("embedding must be non-empty".to_string()));
        }
        Ok(vector)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, schema: &CollectionSchema, index: &IndexKind) -> Result<()> {
        let mut inner = self.inner.write();
        Self::check_open(&inner)?;
        // re-opening an existing collection is a no-op, the schema is kept
        if inner.schema.is_none() {
            inner.schema = Some(schema.clone());
            inner.index = Some(*index);
            tracing::debug!(index = index.index_type(), "collection created");
        }
        Ok(())
    }

    async fn ensure_partition(&self, partition: &str) -> Result<()> {
        let mut inner = self.inner.write();
        Self::check_open(&inner)?;
        inner.partitions.entry(partition.to_string()).or_default();
        Ok(())
    }

    async fn insert(&self, records: Vec<Record>, partition: &str) -> Result<usize> {
        let mut inner = self.inner.write();
        Self::check_open(&inner)?;

        let expected_dim = inner
            .schema
            .as_ref()
            .and_then(|schema| schema.vector_dimension());

        let mut stored = Vec::with_capacity(records.len());
        for mut record in records {
            let vector = Self::extract_vector(&mut record)?;
            if let Some(dim) = expected_dim {
                if vector.len() != dim {
                    return Err(VellumError::Store(format!(
                        "embedding dimension {} does not match collection dimension {}",
                        vector.len(),
                        dim
                    )));
                }
            }
            stored.push((vector, record));
        }

        let count = stored.len();
        let mut next_id = inner.next_id;
        let bucket = inner.partitions.entry(partition.to_string()).or_default();
        for (vector, mut fields) in stored {
            next_id += 1;
            fields.insert("id".to_string(), serde_json::json!(next_id));
            bucket.push(StoredRecord {
                id: next_id,
                vector,
                fields,
            });
        }
        inner.next_id = next_id;

        tracing::debug!(partition, inserted = count, "records inserted");
        Ok(count)
    }

    async fn search(&self, params: SearchParams) -> Result<Vec<SearchHit>> {
        let inner = self.inner.read();
        Self::check_open(&inner)?;

        let filter = params
            .filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(FilterExpr::parse)
            .transpose()?;

        let mut hits = Vec::new();
        for (name, records) in &inner.partitions {
            if let Some(partitions) = &params.partitions {
                if !partitions.contains(name) {
                    continue;
                }
            }
            for record in records {
                if let Some(filter) = &filter {
                    if !filter.matches(&record.fields) {
                        continue;
                    }
                }
                hits.push(SearchHit {
                    id: record.id,
                    score: cosine_similarity(&params.vector, &record.vector),
                    fields: record.fields.clone(),
                });
            }
        }

        sort_hits(&mut hits);
        hits.truncate(params.limit);
        Ok(hits)
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let inner = self.inner.read();
        Self::check_open(&inner)?;
        Ok(inner
            .partitions
            .values()
            .flatten()
            .map(|record| record.fields.clone())
            .collect())
    }

    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize> {
        let mut inner = self.inner.write();
        Self::check_open(&inner)?;
        let mut removed = 0;
        for records in inner.partitions.values_mut() {
            let before = records.len();
            records.retain(|record| {
                record
                    .fields
                    .get("file_id")
                    .and_then(|v| v.as_str())
                    .map(|id| id != file_id)
                    .unwrap_or(true)
            });
            removed += before - records.len();
        }
        Ok(removed)
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        let inner = self.inner.read();
        Self::check_open(&inner)?;
        Ok(inner.partitions.keys().cloned().collect())
    }

    async fn release(&self) -> Result<()> {
        self.inner.write().released = true;
        Ok(())
    }
}
