//! Simple strategy: direct vector search, no LLM involvement

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::search::{SearchQuery, SearchStrategy};
use crate::store::{SearchHit, SearchParams, VectorStore};

pub struct SimpleStrategy {
    documents: Arc<dyn VectorStore>,
    limit: usize,
}

impl SimpleStrategy {
    pub fn new(documents: Arc<dyn VectorStore>, limit: usize) -> Self {
        Self { documents, limit }
    }
}

#[async_trait]
impl SearchStrategy for SimpleStrategy {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let mut params = SearchParams::new(query.embedding.clone(), self.limit);
        if let Some(partitions) = &query.partitions {
            params = params.with_partitions(partitions.clone());
        }
        if let Some(filter) = &query.filter {
            params = params.with_filter(filter.clone());
        }

        let hits = self.documents.search(params).await?;
        tracing::info!(hits = hits.len(), limit = self.limit, "simple search completed");
        Ok(hits)
    }
}
