//! Metadata extraction phase and the selector+metadata strategy
//!
//! Derives structured filter constraints (pages, chapters, image numbers,
//! file type) from the natural-language query via the text LLM, validates
//! them against the catalog, and issues a single filtered search.
//!
//! Validation policy: invalid values are dropped. A document whose
//! proposed metadata validates away entirely degrades to an id-only
//! filter; an unparseable LLM reply degrades the whole phase the same way.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};
use crate::llm::{TextLlm, TextRequest};
use crate::search::catalog::{CatalogEntry, DocumentCatalog};
use crate::search::filter_builder::FilterBuilder;
use crate::search::selector::DocumentSelector;
use crate::search::{SearchQuery, SearchStrategy};
use crate::store::{SearchHit, SearchParams, VectorStore};

const METADATA_SYSTEM_PROMPT: &str = "You extract search constraints from a user query. \
You are given a catalog of documents and the query. For every document, identify which \
pages, chapters, or image numbers the query refers to, if any. Reply with only a JSON \
object keyed by file_id, where each value is an object with the keys: \
\"pages\" (array of page numbers or null), \"chapters\" (array of chapter names or null), \
\"search_image\" (boolean, true when the query asks about images), \
\"num_image\" (array of image numbers or null), \"type_file\" (file type string or null). \
Reply with JSON only, no explanations.";

pub const DEFAULT_METADATA_MAX_TOKENS: u32 = 500;
pub const DEFAULT_METADATA_TEMPERATURE: f32 = 0.2;

/// Per-document constraints proposed by the LLM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default)]
    pub pages: Option<Vec<u32>>,
    #[serde(default)]
    pub chapters: Option<Vec<String>>,
    #[serde(default)]
    pub search_image: bool,
    #[serde(default)]
    pub num_image: Option<Vec<u32>>,
    #[serde(default)]
    pub type_file: Option<String>,
}

impl DocMetadata {
    /// Whether any constraint remains
    pub fn is_empty(&self) -> bool {
        !self.search_image
            && self.pages.as_deref().map(|p| p.is_empty()).unwrap_or(true)
            && self
                .chapters
                .as_deref()
                .map(|c| c.is_empty())
                .unwrap_or(true)
            && self
                .num_image
                .as_deref()
                .map(|n| n.is_empty())
                .unwrap_or(true)
            && self
                .type_file
                .as_deref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true)
    }
}

/// LLM-driven metadata extractor
pub struct MetadataExtractor {
    llm: Arc<dyn TextLlm>,
    max_tokens: u32,
    temperature: f32,
}

impl MetadataExtractor {
    pub fn new(llm: Arc<dyn TextLlm>) -> Self {
        Self {
            llm,
            max_tokens: DEFAULT_METADATA_MAX_TOKENS,
            temperature: DEFAULT_METADATA_TEMPERATURE,
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

    /// Extract validated per-document metadata for the query
    pub async fn extract(
        &self,
        query: &str,
        catalog: &DocumentCatalog,
    ) -> Result<BTreeMap<String, DocMetadata>> {
        if catalog.is_empty() {
            return Ok(BTreeMap::new());
        }

        let request = TextRequest::prompt(format!(
            "{}\n\nUser query: {}",
            catalog.to_markdown(),
            query
        ))
        .with_system_prompt(METADATA_SYSTEM_PROMPT)
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        let response = self.llm.call(request).await?;
        let metadata = parse_metadata_response(&response, catalog);

        tracing::info!(
            documents = catalog.len(),
            with_metadata = metadata.len(),
            "metadata extraction completed"
        );
        Ok(metadata)
    }
}

/// Parse the LLM reply. Code fences are tolerated; an unparseable reply
/// yields an empty map (the strategy then degrades to id-only filters).
pub fn parse_metadata_response(
    response: &str,
    catalog: &DocumentCatalog,
) -> BTreeMap<String, DocMetadata> {
    let body = strip_code_fences(response);

    let parsed: BTreeMap<String, DocMetadata> = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::warn!(%error, "metadata reply is not valid JSON, ignoring it");
            return BTreeMap::new();
        }
    };

    parsed
        .into_iter()
        .filter_map(|(file_id, metadata)| {
            let entry = catalog.get(&file_id)?;
            Some((file_id, validate_metadata(metadata, entry)))
        })
        .collect()
}

/// Drop values inconsistent with the document's declared totals
pub fn validate_metadata(mut metadata: DocMetadata, entry: &CatalogEntry) -> DocMetadata {
    if let Some(pages) = metadata.pages.take() {
        let valid: Vec<u32> = pages
            .into_iter()
            .filter(|page| *page >= 1 && *page <= entry.total_pages)
            .collect();
        metadata.pages = (!valid.is_empty()).then_some(valid);
    }

    if let Some(chapters) = metadata.chapters.take() {
        // chapter names are free-form, keep them only when the document
        // declares chapters at all
        let valid: Vec<String> = chapters
            .into_iter()
            .map(|chapter| chapter.trim().to_string())
            .filter(|chapter| !chapter.is_empty())
            .collect();
        metadata.chapters = (entry.has_chapters && !valid.is_empty()).then_some(valid);
    }

    if let Some(numbers) = metadata.num_image.take() {
        let valid: Vec<u32> = numbers
            .into_iter()
            .filter(|number| *number >= 1 && *number <= entry.total_images)
            .collect();
        metadata.num_image = (!valid.is_empty()).then_some(valid);
    }

    if let Some(type_file) = metadata.type_file.take() {
        let type_file = type_file.trim().to_lowercase();
        metadata.type_file =
            (!type_file.is_empty() && type_file == entry.file_type).then_some(type_file);
    }

    if entry.total_images == 0 {
        metadata.search_image = false;
    }

    metadata
}

fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Three-phase strategy: selection, metadata extraction, one filtered search
pub struct DocumentSelectorMetadataStrategy {
    documents: Arc<dyn VectorStore>,
    selector: DocumentSelector,
    extractor: MetadataExtractor,
    limit: usize,
}

impl DocumentSelectorMetadataStrategy {
    pub fn new(
        documents: Arc<dyn VectorStore>,
        selector: DocumentSelector,
        extractor: MetadataExtractor,
        limit: usize,
    ) -> Self {
        Self {
            documents,
            selector,
            extractor,
            limit,
        }
    }
}

#[async_trait]
impl SearchStrategy for DocumentSelectorMetadataStrategy {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let text = query.text.as_deref().ok_or_else(|| {
            VellumError::InvalidInput(
                "query text is required for the document-selector-metadata strategy".to_string(),
            )
        })?;

        let catalog = self.selector.catalog().await?;
        let selected = self.selector.select_from_catalog(text, &catalog).await?;
        if selected.is_empty() {
            tracing::warn!("no documents selected, returning empty results");
            return Ok(vec![]);
        }

        let metadata = self
            .extractor
            .extract(text, &catalog.subset(&selected))
            .await?;

        let filter = FilterBuilder::for_selection(&selected, &metadata);
        let filter = FilterBuilder::with_caller_filter(filter, query.filter.as_deref())?;

        let mut params = SearchParams::new(query.embedding.clone(), self.limit);
        if let Some(filter) = filter {
            tracing::debug!(%filter, "searching with combined filter");
            params = params.with_filter(filter);
        }

        self.documents.search(params).await
    }
}
