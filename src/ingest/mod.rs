//! Ingestion orchestrator
//!
//! Composes extraction, chunking, embedding, image description, and
//! vector-store insertion for single files and folders. Chunk and image
//! records land in the documents collection, one summary record per
//! document lands in the summaries collection; partitions in both are
//! named by the document id so search can scope scans per document.
//!
//! Failure semantics: extraction or chunk-loss failures abort the whole
//! ingestion with nothing further committed; per-image failures are
//! skipped; a summary failure after the chunks are committed is reported
//! as partial success (chunks are not rolled back).

mod prepare;

pub use prepare::{
    prepare_chunk_records, prepare_image_records, prepare_summary_record, DescribedImage, FileRef,
};

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::chunking::TextChunker;
use crate::embedding::{BatchEmbedder, EmbedderConfig, DEFAULT_MAX_ACCEPTABLE_LOSS};
use crate::error::{Result, VellumError};
use crate::extract::ExtractionManager;
use crate::llm::{ImageDescriber, Summarizer};
use crate::store::{schema_for, IndexKind, SchemaKind, VectorStore};
use crate::types::ExtractionResult;

/// Hex length of a document id
const DOCUMENT_ID_LENGTH: usize = 32;

/// Normalize a path: absolutize against the working directory and remove
/// `.`/`..` components lexically, without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    normalized.components().last(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    normalized.pop();
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Stable document id: hash of the normalized absolute path. The join key
/// between the documents and summaries collections.
pub fn document_id(path: &Path) -> String {
    let normalized = normalize_path(path);
    let mut hasher = Sha256::new();
    hasher.update(normalized.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())[..DOCUMENT_ID_LENGTH].to_string()
}

/// What to do when a document id has already been ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Append new records, duplicates allowed
    #[default]
    Allow,
    /// Fail fast when the document id already exists
    Reject,
    /// Delete prior records for the document id, then ingest
    Replace,
}

impl std::str::FromStr for DedupPolicy {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(DedupPolicy::Allow),
            "reject" => Ok(DedupPolicy::Reject),
            "replace" => Ok(DedupPolicy::Replace),
            _ => Err(VellumError::Config(format!(
                "Unknown dedup policy '{}'. Supported: allow, reject, replace",
                s
            ))),
        }
    }
}

/// Per-pipeline ingestion options
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Describe and store extracted images
    pub process_images: bool,
    /// Re-ingestion policy
    pub dedup: DedupPolicy,
    /// Tolerated fraction of failed chunk embeddings
    pub max_acceptable_loss: f64,
    /// Cancellation signal observed between stages and per-item loops
    pub cancel: CancellationToken,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            process_images: false,
            dedup: DedupPolicy::Allow,
            max_acceptable_loss: DEFAULT_MAX_ACCEPTABLE_LOSS,
            cancel: CancellationToken::new(),
        }
    }
}

/// Identity of the ingested file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestInfo {
    pub file_id: String,
    pub file_name: String,
    pub file_path: String,
}

/// Outcome of a single-file ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub message: String,
    pub info: IngestInfo,
}

/// End-to-end ingestion pipeline
pub struct IngestionPipeline {
    documents: Arc<dyn VectorStore>,
    summaries: Arc<dyn VectorStore>,
    embedder: BatchEmbedder,
    embedding_dim: usize,
    chunker: TextChunker,
    summarizer: Summarizer,
    describer: Option<ImageDescriber>,
    manager: ExtractionManager,
    index: IndexKind,
    options: IngestOptions,
}

impl IngestionPipeline {
    /// Build a pipeline from an embedder configuration. The embedding
    /// dimension is taken from the configured model.
    pub fn new(
        documents: Arc<dyn VectorStore>,
        summaries: Arc<dyn VectorStore>,
        embedder: EmbedderConfig,
        summarizer: Summarizer,
    ) -> Result<Self> {
        let embedding_dim = crate::embedding::build_embedder(&embedder)?.dimensions();
        Ok(Self::with_embedder(
            documents,
            summaries,
            BatchEmbedder::new(embedder),
            embedding_dim,
            summarizer,
        ))
    }

    /// Build from a preconfigured batch embedder and a known dimension
    pub fn with_embedder(
        documents: Arc<dyn VectorStore>,
        summaries: Arc<dyn VectorStore>,
        embedder: BatchEmbedder,
        embedding_dim: usize,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            documents,
            summaries,
            embedder,
            embedding_dim,
            chunker: TextChunker::new(TextChunker::DEFAULT_CHUNK_SIZE, 0)
                .expect("default chunker parameters are valid"),
            summarizer,
            describer: None,
            manager: ExtractionManager::new(),
            index: IndexKind::default(),
            options: IngestOptions::default(),
        }
    }

    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_describer(mut self, describer: ImageDescriber) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn with_index(mut self, index: IndexKind) -> Self {
        self.index = index;
        self
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Ingest a single file end to end
    pub async fn ingest_file(&self, path: &Path, extract_images: bool) -> IngestOutcome {
        let info = self.info_for(path);
        tracing::info!(
            file_id = %info.file_id,
            path = %info.file_path,
            extract_images,
            "starting ingestion"
        );

        let extraction = match self.manager.extract_file(path, extract_images) {
            Ok(extraction) => extraction,
            Err(error) => return self.failure(info, &error),
        };
        self.ingest_extracted(extraction, info).await
    }

    /// Ingest an already-extracted document, e.g. produced by a custom
    /// extractor outside the built-in registry.
    pub async fn ingest_extraction(
        &self,
        path: &Path,
        extraction: ExtractionResult,
    ) -> IngestOutcome {
        let info = self.info_for(path);
        if let Err(error) = extraction.validate() {
            return self.failure(info, &error);
        }
        self.ingest_extracted(extraction, info).await
    }

    /// Ingest every supported file in a folder: parallel extraction, then
    /// sequential per-file processing. Extraction failures are reported as
    /// per-file outcomes and never abort the batch.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        extract_images: bool,
    ) -> Result<Vec<IngestOutcome>> {
        let extraction = self
            .manager
            .extract_folder(folder, extract_images, None)
            .await?;

        let mut outcomes = Vec::new();
        for (path, error) in &extraction.failed {
            outcomes.push(self.failure(self.info_for(path), error));
        }
        for (path, extracted) in extraction.succeeded {
            if self.options.cancel.is_cancelled() {
                outcomes.push(self.failure(self.info_for(&path), &VellumError::Cancelled));
                continue;
            }
            let info = self.info_for(&path);
            outcomes.push(self.ingest_extracted(extracted, info).await);
        }
        Ok(outcomes)
    }

    /// Run an operation against the pipeline and release both store
    /// handles afterwards, on success and on every error path.
    pub async fn scoped<T, F, Fut>(self, operate: F) -> Result<T>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let pipeline = Arc::new(self);
        let result = operate(Arc::clone(&pipeline)).await;
        if let Err(close_error) = pipeline.close().await {
            match result {
                Ok(_) => return Err(close_error),
                Err(_) => {
                    tracing::error!(%close_error, "failed to release stores after error")
                }
            }
        }
        result
    }

    /// Release both store handles
    pub async fn close(&self) -> Result<()> {
        self.documents.release().await?;
        self.summaries.release().await?;
        Ok(())
    }

    fn info_for(&self, path: &Path) -> IngestInfo {
        IngestInfo {
            file_id: document_id(path),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_path: path.display().to_string(),
        }
    }

    fn failure(&self, info: IngestInfo, error: &VellumError) -> IngestOutcome {
        tracing::error!(file_id = %info.file_id, %error, "ingestion failed");
        IngestOutcome {
            success: false,
            message: format!("Error ingesting {}: {}", info.file_name, error),
            info,
        }
    }

    async fn ingest_extracted(
        &self,
        extraction: ExtractionResult,
        info: IngestInfo,
    ) -> IngestOutcome {
        match self.ingest_inner(&extraction, &info).await {
            Ok(message) => {
                tracing::info!(file_id = %info.file_id, %message, "ingestion finished");
                IngestOutcome {
                    success: true,
                    message,
                    info,
                }
            }
            Err(error) => self.failure(info, &error),
        }
    }

    async fn ingest_inner(
        &self,
        extraction: &ExtractionResult,
        info: &IngestInfo,
    ) -> Result<String> {
        self.check_cancelled()?;

        let file = FileRef {
            file_id: info.file_id.clone(),
            file_name: extraction.metadata.file_name.clone(),
            file_type: extraction.metadata.file_type.clone(),
        };

        self.documents
            .ensure_collection(
                &schema_for(SchemaKind::Document, self.embedding_dim),
                &self.index,
            )
            .await?;
        self.summaries
            .ensure_collection(
                &schema_for(SchemaKind::Summary, self.embedding_dim),
                &self.index,
            )
            .await?;

        self.apply_dedup_policy(&file).await?;

        // chunk and embed with partial-failure tolerance
        self.check_cancelled()?;
        let chunks = self.chunker.chunk(&extraction.content);
        if chunks.is_empty() {
            return Err(VellumError::InvalidInput(format!(
                "no text content in {}",
                file.file_name
            )));
        }
        let embedded = self
            .embedder
            .embed_chunks(&chunks, self.options.max_acceptable_loss)
            .await?;

        self.documents.ensure_partition(&file.file_id).await?;
        let records = prepare_chunk_records(&embedded, &file);
        let chunk_count = records.len();
        self.documents.insert(records, &file.file_id).await?;

        let mut images_processed = 0;
        if self.options.process_images {
            if let (Some(describer), Some(images)) = (&self.describer, &extraction.images) {
                images_processed = self.upload_images(describer, images, &file).await?;
            }
        }

        let mut message = format!(
            "Document {} uploaded successfully ({} chunks)",
            file.file_name, chunk_count
        );
        if images_processed > 0 {
            message.push_str(&format!(" (with {} images processed)", images_processed));
        }

        // summary failures leave the committed chunks in place
        self.check_cancelled()?;
        if let Err(error) = self.upload_summary(extraction, &file).await {
            tracing::warn!(file_id = %file.file_id, %error, "summary step failed");
            message = format!(
                "Document {} uploaded ({} chunks) but summary failed: {}",
                file.file_name, chunk_count, error
            );
        }

        Ok(message)
    }

    async fn apply_dedup_policy(&self, file: &FileRef) -> Result<()> {
        match self.options.dedup {
            DedupPolicy::Allow => Ok(()),
            DedupPolicy::Reject => {
                let exists = self
                    .summaries
                    .list_partitions()
                    .await?
                    .contains(&file.file_id);
                if exists {
                    Err(VellumError::InvalidInput(format!(
                        "document {} already ingested as {}",
                        file.file_name, file.file_id
                    )))
                } else {
                    Ok(())
                }
            }
            DedupPolicy::Replace => {
                let documents = self.documents.delete_by_file_id(&file.file_id).await?;
                let summaries = self.summaries.delete_by_file_id(&file.file_id).await?;
                if documents + summaries > 0 {
                    tracing::info!(
                        file_id = %file.file_id,
                        documents,
                        summaries,
                        "replaced prior records"
                    );
                }
                Ok(())
            }
        }
    }

    /// Describe, embed, and insert images one by one. Every per-image
    /// failure is logged and skipped; siblings keep going.
    async fn upload_images(
        &self,
        describer: &ImageDescriber,
        images: &[crate::types::ImageData],
        file: &FileRef,
    ) -> Result<usize> {
        if images.is_empty() {
            return Ok(0);
        }

        let embedder = self.embedder.embedder()?;
        let mut described = Vec::new();

        for image in images {
            self.check_cancelled()?;
            if image.validate().is_err() || image.image_base64.is_empty() {
                tracing::debug!(
                    file_id = %file.file_id,
                    image_number = image.image_number,
                    "skipping invalid image"
                );
                continue;
            }

            let description = match describer.describe(&image.image_base64).await {
                Ok(description) => description,
                Err(error) => {
                    tracing::warn!(
                        file_id = %file.file_id,
                        image_number = image.image_number,
                        %error,
                        "failed to describe image, skipping"
                    );
                    continue;
                }
            };

            let embedding = match embedder.embed(&description).await {
                Ok(embedding) => embedding,
                Err(error) => {
                    tracing::warn!(
                        file_id = %file.file_id,
                        image_number = image.image_number,
                        %error,
                        "failed to embed image description, skipping"
                    );
                    continue;
                }
            };

            described.push(DescribedImage {
                image: image.clone(),
                description,
                embedding,
            });
        }

        if !described.is_empty() {
            let records = prepare_image_records(&described, file);
            self.documents.insert(records, &file.file_id).await?;
        }

        tracing::info!(
            file_id = %file.file_id,
            input_images = images.len(),
            processed = described.len(),
            "image processing completed"
        );
        Ok(described.len())
    }

    /// Join pages, summarize, embed, and insert exactly one summary record
    async fn upload_summary(&self, extraction: &ExtractionResult, file: &FileRef) -> Result<()> {
        let full_text = extraction
            .content
            .iter()
            .map(|page| page.trim())
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if full_text.is_empty() {
            return Err(VellumError::InvalidInput(
                "no text content to summarize".to_string(),
            ));
        }

        let summary = self.summarizer.summarize(&full_text).await?;
        let embedding = self.embedder.embedder()?.embed(&summary).await?;

        let total_pages = extraction
            .metadata
            .total_pages()
            .map(|pages| pages as usize)
            .unwrap_or_else(|| extraction.page_count());
        let total_images = if extraction.image_count() > 0 {
            extraction.image_count()
        } else {
            extraction.metadata.total_images() as usize
        };

        let record = prepare_summary_record(
            &summary,
            &embedding,
            file,
            total_pages,
            extraction.metadata.has_chapters(),
            total_images,
        );

        self.summaries.ensure_partition(&file.file_id).await?;
        self.summaries.insert(vec![record], &file.file_id).await?;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.options.cancel.is_cancelled() {
            Err(VellumError::Cancelled)
        } else {
            Ok(())
        }
    }
}
