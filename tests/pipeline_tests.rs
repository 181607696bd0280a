//! End-to-end pipeline tests
//!
//! Exercise ingestion and search against the in-memory store with the
//! TF-IDF embedder and scripted LLMs, so the full extraction → chunking →
//! embedding → insertion → search path runs without network access.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::tempdir;

use vellum::chunking::TextChunker;
use vellum::embedding::{build_embedder, EmbedderConfig};
use vellum::error::{Result, VellumError};
use vellum::ingest::{DedupPolicy, IngestOptions, IngestionPipeline};
use vellum::llm::{ImageDescriber, Summarizer, TextLlm, TextRequest, VisionLlm, VisionRequest};
use vellum::search::{build_strategy, SearchQuery, StrategyKind};
use vellum::store::{MemoryStore, SearchParams, VectorStore};
use vellum::types::{ExtractionResult, FileMetadata, ImageData, PdfMetadata};
use vellum::document_id;

const DIMS: usize = 64;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Text LLM replying with a fixed string
struct StaticLlm(String);

#[async_trait]
impl TextLlm for StaticLlm {
    async fn call(&self, _request: TextRequest) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Text LLM replying with queued responses, one per call
struct ScriptedLlm(Mutex<VecDeque<String>>);

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Self {
        Self(Mutex::new(responses.iter().map(|r| r.to_string()).collect()))
    }
}

#[async_trait]
impl TextLlm for ScriptedLlm {
    async fn call(&self, _request: TextRequest) -> Result<String> {
        self.0
            .lock()
            .pop_front()
            .ok_or_else(|| VellumError::Llm("no scripted response left".to_string()))
    }
}

/// Text LLM that always fails
struct FailingLlm;

#[async_trait]
impl TextLlm for FailingLlm {
    async fn call(&self, _request: TextRequest) -> Result<String> {
        Err(VellumError::Llm("model unavailable".to_string()))
    }
}

/// Vision LLM that fails for payloads containing "bad"
struct PickyVision;

#[async_trait]
impl VisionLlm for PickyVision {
    async fn call(&self, request: VisionRequest) -> Result<String> {
        if request.images.iter().any(|image| image.contains("bad")) {
            Err(VellumError::Llm("cannot read this image".to_string()))
        } else {
            Ok("a detailed diagram".to_string())
        }
    }
}

fn tfidf() -> EmbedderConfig {
    EmbedderConfig::TfIdf { dimensions: DIMS }
}

async fn embed(text: &str) -> Vec<f32> {
    build_embedder(&tfidf())
        .unwrap()
        .embed(text)
        .await
        .unwrap()
        .vector
}

fn pipeline(
    documents: &Arc<MemoryStore>,
    summaries: &Arc<MemoryStore>,
    summary_llm: Arc<dyn TextLlm>,
) -> IngestionPipeline {
    IngestionPipeline::new(
        Arc::clone(documents) as Arc<dyn VectorStore>,
        Arc::clone(summaries) as Arc<dyn VectorStore>,
        tfidf(),
        Summarizer::new(summary_llm),
    )
    .unwrap()
}

fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
    (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn small_txt_ingest() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "Hello world.").unwrap();

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("A tiny greeting document.".to_string())),
    );

    let outcome = pipeline.ingest_file(&path, false).await;
    assert!(outcome.success, "unexpected failure: {}", outcome.message);
    assert_eq!(outcome.info.file_id, document_id(&path));
    assert_eq!(outcome.info.file_name, "a.txt");

    // one chunk record
    let chunk_records = documents.fetch_all().await.unwrap();
    assert_eq!(chunk_records.len(), 1);
    let chunk = &chunk_records[0];
    assert_eq!(chunk["text"], "Hello world.");
    assert_eq!(chunk["pages"], "1");
    assert_eq!(chunk["chapters"], "");
    assert_eq!(chunk["file_type"], "txt");
    assert_eq!(chunk["file_id"], outcome.info.file_id.as_str());

    // exactly one summary record
    let summary_records = summaries.fetch_all().await.unwrap();
    assert_eq!(summary_records.len(), 1);
    let summary = &summary_records[0];
    assert_eq!(summary["text"], "A tiny greeting document.");
    assert_eq!(summary["file_type"], "summary_txt");
    assert_eq!(summary["file_name"], "summary_a.txt");
    assert_eq!(summary["pages"], "1");
}

#[tokio::test]
async fn reingestion_follows_dedup_policy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "Hello again.").unwrap();

    let (documents, summaries) = stores();
    let llm: Arc<dyn TextLlm> = Arc::new(StaticLlm("summary".to_string()));

    // allow: duplicates accumulate, same file_id both times
    let allow = pipeline(&documents, &summaries, Arc::clone(&llm));
    let first = allow.ingest_file(&path, false).await;
    let second = allow.ingest_file(&path, false).await;
    assert!(first.success && second.success);
    assert_eq!(first.info.file_id, second.info.file_id);
    assert_eq!(documents.len(), 2);
    assert_eq!(summaries.len(), 2);

    // reject: a third attempt fails fast
    let reject = pipeline(&documents, &summaries, Arc::clone(&llm)).with_options(IngestOptions {
        dedup: DedupPolicy::Reject,
        ..Default::default()
    });
    let third = reject.ingest_file(&path, false).await;
    assert!(!third.success);
    assert!(third.message.contains("already ingested"));
    assert_eq!(documents.len(), 2);

    // replace: prior records are dropped first
    let replace = pipeline(&documents, &summaries, llm).with_options(IngestOptions {
        dedup: DedupPolicy::Replace,
        ..Default::default()
    });
    let fourth = replace.ingest_file(&path, false).await;
    assert!(fourth.success);
    assert_eq!(documents.len(), 1);
    assert_eq!(summaries.len(), 1);
}

#[tokio::test]
async fn summary_failure_is_partial_success() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "Content that chunks fine.").unwrap();

    let (documents, summaries) = stores();
    let pipeline = pipeline(&documents, &summaries, Arc::new(FailingLlm));

    let outcome = pipeline.ingest_file(&path, false).await;
    assert!(outcome.success);
    assert!(outcome.message.contains("summary failed"));
    assert_eq!(documents.len(), 1, "chunks stay committed");
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn extraction_failure_commits_nothing() {
    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("s".to_string())),
    );

    let outcome = pipeline
        .ingest_file(Path::new("/missing/nowhere.txt"), false)
        .await;
    assert!(!outcome.success);
    assert!(documents.is_empty());
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn image_failures_skip_siblings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.pdf");

    let extraction = ExtractionResult {
        content: vec!["Page one text.".to_string(), "Page two text.".to_string()],
        images: Some(vec![
            ImageData {
                page: 1,
                image_number_in_page: 1,
                image_number: 1,
                image_base64: "badpayload".to_string(),
                image_format: "png".to_string(),
            },
            ImageData {
                page: 2,
                image_number_in_page: 1,
                image_number: 2,
                image_base64: "goodpayload".to_string(),
                image_format: "png".to_string(),
            },
        ]),
        metadata: FileMetadata {
            file_name: "report.pdf".to_string(),
            file_type: "pdf".to_string(),
            pdf: Some(PdfMetadata {
                total_pages: 2,
                total_images: 2,
                has_chapters: false,
            }),
        },
    };

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("summary".to_string())),
    )
    .with_describer(ImageDescriber::new(Arc::new(PickyVision)))
    .with_options(IngestOptions {
        process_images: true,
        ..Default::default()
    });

    let outcome = pipeline.ingest_extraction(&path, extraction).await;
    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.message.contains("1 images processed"));

    let records = documents.fetch_all().await.unwrap();
    let image_records: Vec<_> = records
        .iter()
        .filter(|r| r["file_type"] == "image_pdf")
        .collect();
    assert_eq!(image_records.len(), 1);
    assert_eq!(image_records[0]["image_number"], "2");
    assert_eq!(image_records[0]["text"], "a detailed diagram");

    // summary still records the declared image total
    let summary = &summaries.fetch_all().await.unwrap()[0];
    assert_eq!(summary["full_images"], "2");
}

#[tokio::test]
async fn cancelled_pipeline_does_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "text").unwrap();

    let options = IngestOptions::default();
    options.cancel.cancel();

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("s".to_string())),
    )
    .with_options(options);

    let outcome = pipeline.ingest_file(&path, false).await;
    assert!(!outcome.success);
    assert!(documents.is_empty());
}

#[tokio::test]
async fn folder_ingest_reports_per_file_outcomes() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("one.txt"), "first document").unwrap();
    std::fs::write(dir.path().join("two.txt"), "second document").unwrap();

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("summary".to_string())),
    );

    let outcomes = pipeline.ingest_folder(dir.path(), false).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.success));
    assert_eq!(summaries.len(), 2);
}

#[tokio::test]
async fn scoped_releases_stores() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "scoped content").unwrap();

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("summary".to_string())),
    );

    let outcome = pipeline
        .scoped(|p| async move { Ok(p.ingest_file(&path, false).await) })
        .await
        .unwrap();
    assert!(outcome.success);

    // the handles were released on exit
    assert!(documents
        .search(SearchParams::new(vec![0.0; DIMS], 1))
        .await
        .is_err());
}

#[tokio::test]
async fn chunking_with_overlap_in_pipeline() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("long.txt");
    std::fs::write(
        &path,
        "First part of text. Second part. Third part. Fourth part.",
    )
    .unwrap();

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("summary".to_string())),
    )
    .with_chunker(TextChunker::new(50, 20).unwrap());

    let outcome = pipeline.ingest_file(&path, false).await;
    assert!(outcome.success);

    let records = documents.fetch_all().await.unwrap();
    assert!(records.len() >= 2);

    // adjacent chunks share at least one whole word
    let texts: Vec<&str> = records.iter().map(|r| r["text"].as_str().unwrap()).collect();
    for pair in texts.windows(2) {
        let left: Vec<&str> = pair[0].split_whitespace().collect();
        let shared = pair[1].split_whitespace().any(|w| left.contains(&w));
        assert!(shared, "no shared word between {:?} and {:?}", pair[0], pair[1]);
    }
}

// ============================================================================
// SEARCH STRATEGIES
// ============================================================================

#[tokio::test]
async fn simple_search_finds_exact_chunk() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("cats.txt"), "Cats sleep most of the day.").unwrap();
    std::fs::write(dir.path().join("rust.txt"), "Rust prevents data races.").unwrap();

    let (documents, summaries) = stores();
    let pipeline = pipeline(
        &documents,
        &summaries,
        Arc::new(StaticLlm("summary".to_string())),
    );
    pipeline.ingest_folder(dir.path(), false).await.unwrap();

    let strategy = build_strategy(
        StrategyKind::Simple,
        Arc::clone(&documents) as Arc<dyn VectorStore>,
        Arc::clone(&summaries) as Arc<dyn VectorStore>,
        None,
        5,
    )
    .unwrap();

    let query = SearchQuery::new(embed("Cats sleep most of the day.").await);
    let hits = strategy.search(&query).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].text(), "Cats sleep most of the day.");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

/// Insert a chunk record by hand, scoped to its own partition
async fn seed_chunk(store: &MemoryStore, file_id: &str, text: &str, pages: &str) {
    let record = serde_json::json!({
        "file_id": file_id,
        "file_type": "txt",
        "file_name": format!("{}.txt", file_id),
        "text": text,
        "text_embedding": embed(text).await,
        "pages": pages,
        "chapters": "",
        "image_number": "",
        "image_number_in_page": "",
        "full_images": "",
        "date": "2024-01-01",
    })
    .as_object()
    .unwrap()
    .clone();
    store.insert(vec![record], file_id).await.unwrap();
}

/// Insert a summary record by hand
async fn seed_summary(store: &MemoryStore, file_id: &str, name: &str, about: &str) {
    let record = serde_json::json!({
        "file_id": file_id,
        "file_type": "summary_txt",
        "file_name": format!("summary_{}", name),
        "text": about,
        "text_embedding": embed(about).await,
        "pages": "3",
        "chapters": "false",
        "full_images": "0",
        "date": "2024-01-01",
    })
    .as_object()
    .unwrap()
    .clone();
    store.insert(vec![record], file_id).await.unwrap();
}

#[tokio::test]
async fn document_selector_searches_only_selected_partitions() {
    let (documents, summaries) = stores();

    for (id, topic) in [
        ("doc_001", "feline behavior"),
        ("doc_002", "rust programming"),
        ("doc_003", "cat nutrition"),
    ] {
        seed_summary(&summaries, id, &format!("{}.txt", id), topic).await;
        seed_chunk(&documents, id, &format!("All about {}.", topic), "1").await;
    }

    let llm: Arc<dyn TextLlm> = Arc::new(StaticLlm("doc_001, doc_003, invalid_id".to_string()));
    let strategy = build_strategy(
        StrategyKind::DocumentSelector,
        Arc::clone(&documents) as Arc<dyn VectorStore>,
        Arc::clone(&summaries) as Arc<dyn VectorStore>,
        Some(llm),
        5,
    )
    .unwrap();

    let query = SearchQuery::new(embed("tell me about cats").await)
        .with_text("tell me about cats");
    let hits = strategy.search(&query).await.unwrap();

    assert!(!hits.is_empty());
    assert!(hits.len() <= 5);
    for hit in &hits {
        assert_ne!(hit.file_id(), "doc_002", "unselected document leaked in");
    }
}

#[tokio::test]
async fn document_selector_requires_query_text() {
    let (documents, summaries) = stores();
    let strategy = build_strategy(
        StrategyKind::DocumentSelector,
        Arc::clone(&documents) as Arc<dyn VectorStore>,
        Arc::clone(&summaries) as Arc<dyn VectorStore>,
        Some(Arc::new(StaticLlm("".to_string())) as Arc<dyn TextLlm>),
        5,
    )
    .unwrap();

    let err = strategy
        .search(&SearchQuery::new(vec![0.0; DIMS]))
        .await
        .unwrap_err();
    assert!(matches!(err, VellumError::InvalidInput(_)));
}

#[tokio::test]
async fn empty_selection_returns_empty_results() {
    let (documents, summaries) = stores();
    seed_summary(&summaries, "doc_001", "a.txt", "something").await;
    seed_chunk(&documents, "doc_001", "content", "1").await;

    let strategy = build_strategy(
        StrategyKind::DocumentSelector,
        Arc::clone(&documents) as Arc<dyn VectorStore>,
        Arc::clone(&summaries) as Arc<dyn VectorStore>,
        Some(Arc::new(StaticLlm("none match".to_string())) as Arc<dyn TextLlm>),
        5,
    )
    .unwrap();

    let query = SearchQuery::new(embed("anything").await).with_text("anything");
    let hits = strategy.search(&query).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn metadata_strategy_filters_by_pages() {
    let (documents, summaries) = stores();

    seed_summary(&summaries, "doc_001", "book.txt", "a long book").await;
    seed_chunk(&documents, "doc_001", "chapter opening on page one", "1").await;
    seed_chunk(&documents, "doc_001", "conclusions on page two", "2").await;
    seed_summary(&summaries, "doc_002", "other.txt", "another book").await;
    seed_chunk(&documents, "doc_002", "unrelated content", "1").await;

    // first call selects, second call extracts metadata
    let llm: Arc<dyn TextLlm> = Arc::new(ScriptedLlm::new(&[
        "doc_001",
        r#"{"doc_001": {"pages": [2], "chapters": null, "search_image": false, "num_image": null, "type_file": null}}"#,
    ]));

    let strategy = build_strategy(
        StrategyKind::DocumentSelectorMetadata,
        Arc::clone(&documents) as Arc<dyn VectorStore>,
        Arc::clone(&summaries) as Arc<dyn VectorStore>,
        Some(llm),
        5,
    )
    .unwrap();

    let query = SearchQuery::new(embed("what are the conclusions").await)
        .with_text("what are the conclusions");
    let hits = strategy.search(&query).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text(), "conclusions on page two");
    assert_eq!(hits[0].pages(), "2");
}

#[tokio::test]
async fn metadata_strategy_degrades_to_id_filter_on_garbage() {
    let (documents, summaries) = stores();

    seed_summary(&summaries, "doc_001", "book.txt", "a long book").await;
    seed_chunk(&documents, "doc_001", "some content", "1").await;
    seed_summary(&summaries, "doc_002", "other.txt", "another").await;
    seed_chunk(&documents, "doc_002", "other content", "1").await;

    let llm: Arc<dyn TextLlm> =
        Arc::new(ScriptedLlm::new(&["doc_001", "this is not json"]));

    let strategy = build_strategy(
        StrategyKind::DocumentSelectorMetadata,
        Arc::clone(&documents) as Arc<dyn VectorStore>,
        Arc::clone(&summaries) as Arc<dyn VectorStore>,
        Some(llm),
        5,
    )
    .unwrap();

    let query = SearchQuery::new(embed("some content").await).with_text("some content");
    let hits = strategy.search(&query).await.unwrap();

    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.file_id(), "doc_001");
    }
}
