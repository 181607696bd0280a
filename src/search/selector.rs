//! Document selection phase and the selector strategy
//!
//! Phase 1 narrows the search scope: render the catalog, ask the text LLM
//! which documents are worth searching, and intersect its answer with the
//! known ids. Phase 2 scans the selected per-document partitions and
//! merges the results.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, VellumError};
use crate::llm::{TextLlm, TextRequest};
use crate::search::catalog::DocumentCatalog;
use crate::search::{SearchQuery, SearchStrategy};
use crate::store::{sort_hits, SearchHit, VectorStore};

const SELECTION_SYSTEM_PROMPT: &str = "You are a retrieval router. You are given a \
catalog of documents and a user query. Reply with only the file_id values of the \
documents worth searching for this query, separated by commas. Do not explain. If no \
document is relevant, reply with an empty line.";

pub const DEFAULT_SELECTION_MAX_TOKENS: u32 = 500;
pub const DEFAULT_SELECTION_TEMPERATURE: f32 = 0.2;

/// LLM-driven document selector over the summaries collection
pub struct DocumentSelector {
    summaries: Arc<dyn VectorStore>,
    llm: Arc<dyn TextLlm>,
    max_tokens: u32,
    temperature: f32,
}

impl DocumentSelector {
    pub fn new(summaries: Arc<dyn VectorStore>, llm: Arc<dyn TextLlm>) -> Self {
        Self {
            summaries,
            llm,
            max_tokens: DEFAULT_SELECTION_MAX_TOKENS,
            temperature: DEFAULT_SELECTION_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the catalog from every summary record
    pub async fn catalog(&self) -> Result<DocumentCatalog> {
        let records = self.summaries.fetch_all().await?;
        let catalog = DocumentCatalog::from_records(&records);
        tracing::debug!(documents = catalog.len(), "catalog retrieved");
        Ok(catalog)
    }

    /// Select documents worth searching for the query
    pub async fn select(&self, query: &str) -> Result<Vec<String>> {
        let catalog = self.catalog().await?;
        self.select_from_catalog(query, &catalog).await
    }

    /// Selection against an already-retrieved catalog
    pub async fn select_from_catalog(
        &self,
        query: &str,
        catalog: &DocumentCatalog,
    ) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(VellumError::InvalidInput(
                "query text must be non-empty".to_string(),
            ));
        }
        if catalog.is_empty() {
            tracing::warn!("no documents in the catalog, selection is empty");
            return Ok(vec![]);
        }

        let request = TextRequest::prompt(format!(
            "{}\n\nUser query: {}",
            catalog.to_markdown(),
            query
        ))
        .with_system_prompt(SELECTION_SYSTEM_PROMPT)
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        let response = self.llm.call(request).await?;
        let selected = parse_selected_ids(&response, catalog);

        tracing::info!(
            available = catalog.len(),
            selected = selected.len(),
            "document selection completed"
        );
        Ok(selected)
    }
}

/// Tokenize the LLM reply on commas and whitespace, keep only known ids,
/// drop duplicates. Unknown ids are dropped silently.
pub fn parse_selected_ids(response: &str, catalog: &DocumentCatalog) -> Vec<String> {
    let mut selected = Vec::new();
    for token in response.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'');
        if token.is_empty() {
            continue;
        }
        if catalog.contains(token) && !selected.iter().any(|s| s == token) {
            selected.push(token.to_string());
        }
    }
    selected
}

/// Two-phase strategy: LLM document selection, then per-partition scans
pub struct DocumentSelectorStrategy {
    documents: Arc<dyn VectorStore>,
    selector: DocumentSelector,
    limit: usize,
}

impl DocumentSelectorStrategy {
    pub fn new(documents: Arc<dyn VectorStore>, selector: DocumentSelector, limit: usize) -> Self {
        Self {
            documents,
            selector,
            limit,
        }
    }
}

#[async_trait]
impl SearchStrategy for DocumentSelectorStrategy {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let text = query.text.as_deref().ok_or_else(|| {
            VellumError::InvalidInput(
                "query text is required for the document-selector strategy".to_string(),
            )
        })?;

        let selected = self.selector.select(text).await?;
        if selected.is_empty() {
            tracing::warn!("no documents selected, returning empty results");
            return Ok(vec![]);
        }

        let mut all_hits: Vec<SearchHit> = Vec::new();
        for file_id in &selected {
            match self
                .documents
                .search_by_partition(&query.embedding, file_id, self.limit)
                .await
            {
                Ok(hits) => {
                    tracing::debug!(file_id = %file_id, hits = hits.len(), "partition searched");
                    all_hits.extend(hits);
                }
                Err(error) => {
                    tracing::warn!(file_id = %file_id, %error, "partition search failed, skipping");
                }
            }
        }

        sort_hits(&mut all_hits);
        all_hits.truncate(self.limit);
        Ok(all_hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use serde_json::json;

    fn catalog(ids: &[&str]) -> DocumentCatalog {
        let records: Vec<Record> = ids
            .iter()
            .map(|id| {
                json!({
                    "file_id": id,
                    "file_name": format!("summary_{}.pdf", id),
                    "file_type": "summary_pdf",
                    "text": "a document",
                    "pages": "5",
                    "chapters": "false",
                    "full_images": "0",
                })
                .as_object()
                .unwrap()
                .clone()
            })
            .collect();
        DocumentCatalog::from_records(&records)
    }

    #[test]
    fn test_parse_drops_unknown_ids() {
        let catalog = catalog(&["doc_001", "doc_002", "doc_003"]);
        let selected = parse_selected_ids("doc_001, doc_003, invalid_id", &catalog);
        assert_eq!(selected, vec!["doc_001", "doc_003"]);
    }

    #[test]
    fn test_parse_handles_newlines_and_duplicates() {
        let catalog = catalog(&["doc_001", "doc_002"]);
        let selected = parse_selected_ids("doc_002\ndoc_001 doc_002", &catalog);
        assert_eq!(selected, vec!["doc_002", "doc_001"]);
    }

    #[test]
    fn test_parse_strips_formatting() {
        let catalog = catalog(&["doc_001"]);
        let selected = parse_selected_ids("`doc_001`", &catalog);
        assert_eq!(selected, vec!["doc_001"]);
    }

    #[test]
    fn test_parse_empty_response() {
        let catalog = catalog(&["doc_001"]);
        assert!(parse_selected_ids("", &catalog).is_empty());
        assert!(parse_selected_ids("none of them", &catalog).is_empty());
    }
}
