//! Search strategy engine
//!
//! Three strategies of increasing precision, selected by configuration:
//! - simple: direct vector search
//! - document_selector: LLM narrows the scope to a document subset, then
//!   per-partition scans
//! - document_selector_metadata: same selection, plus LLM-derived filter
//!   constraints compiled into one filtered search

mod catalog;
mod filter_builder;
mod metadata;
mod selector;
mod simple;

pub use catalog::{CatalogEntry, DocumentCatalog};
pub use filter_builder::FilterBuilder;
pub use metadata::{
    parse_metadata_response, validate_metadata, DocMetadata, DocumentSelectorMetadataStrategy,
    MetadataExtractor, DEFAULT_METADATA_MAX_TOKENS, DEFAULT_METADATA_TEMPERATURE,
};
pub use selector::{
    parse_selected_ids, DocumentSelector, DocumentSelectorStrategy,
    DEFAULT_SELECTION_MAX_TOKENS, DEFAULT_SELECTION_TEMPERATURE,
};
pub use simple::SimpleStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};
use crate::llm::TextLlm;
use crate::store::{SearchHit, VectorStore};

/// Default number of hits returned by a strategy
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A query against the documents collection
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Embedding of the question
    pub embedding: Vec<f32>,
    /// The natural-language question; required by the selector strategies
    pub text: Option<String>,
    /// Partition scope pass-through (simple strategy only)
    pub partitions: Option<Vec<String>>,
    /// Caller-supplied filter expression
    pub filter: Option<String>,
}

impl SearchQuery {
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            text: None,
            partitions: None,
            filter: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
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

/// A search strategy produces a ranked list of chunk records
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>>;
}

/// Strategy registry, keyed by string and closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Simple,
    DocumentSelector,
    DocumentSelectorMetadata,
}

impl std::str::FromStr for StrategyKind {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(StrategyKind::Simple),
            "document_selector" => Ok(StrategyKind::DocumentSelector),
            "document_selector_metadata" => Ok(StrategyKind::DocumentSelectorMetadata),
            _ => Err(VellumError::Config(format!(
                "Unknown search strategy '{}'. Supported: simple, document_selector, \
                 document_selector_metadata",
                s
            ))),
        }
    }
}

/// Build a strategy. The selector strategies require the summaries store
/// and a text LLM; the simple strategy ignores both.
pub fn build_strategy(
    kind: StrategyKind,
    documents: Arc<dyn VectorStore>,
    summaries: Arc<dyn VectorStore>,
    llm: Option<Arc<dyn TextLlm>>,
    limit: usize,
) -> Result<Arc<dyn SearchStrategy>> {
    match kind {
        StrategyKind::Simple => Ok(Arc::new(SimpleStrategy::new(documents, limit))),
        StrategyKind::DocumentSelector => {
            let llm = require_llm(llm, "document_selector")?;
            Ok(Arc::new(DocumentSelectorStrategy::new(
                documents,
                DocumentSelector::new(summaries, llm),
                limit,
            )))
        }
        StrategyKind::DocumentSelectorMetadata => {
            let llm = require_llm(llm, "document_selector_metadata")?;
            Ok(Arc::new(DocumentSelectorMetadataStrategy::new(
                documents,
                DocumentSelector::new(summaries, Arc::clone(&llm)),
                MetadataExtractor::new(llm),
                limit,
            )))
        }
    }
}

fn require_llm(llm: Option<Arc<dyn TextLlm>>, strategy: &str) -> Result<Arc<dyn TextLlm>> {
    llm.ok_or_else(|| {
        VellumError::Config(format!(
            "a text LLM is required for the {} strategy",
            strategy
        ))
    })
}
