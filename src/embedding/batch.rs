//! Parallel batch embedding with per-item retry
//!
//! Two distinct paths with different failure semantics:
//! - [`BatchEmbedder::embed_batch`]: search-time throughput. Any
//!   unrecoverable per-item failure aborts the whole operation.
//! - [`BatchEmbedder::embed_chunks`]: ingestion. Per-chunk failures are
//!   dropped until the cumulative loss exceeds `max_acceptable_loss`.
//!
//! Each worker constructs its own embedder from the factory; live provider
//! clients never cross task boundaries.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::chunking::Chunk;
use crate::embedding::{Embedder, EmbedderConfig, EmbedderFactory, Embedding};
use crate::error::{Result, VellumError};

/// Default number of texts per worker batch
pub const DEFAULT_BATCH_SIZE: usize = 20;
/// Default number of retry attempts for rate-limited calls
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default backoff before retrying a rate-limited call
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Default tolerated fraction of failed chunk embeddings
pub const DEFAULT_MAX_ACCEPTABLE_LOSS: f64 = 0.10;

/// A chunk together with its embedding
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

/// Batch embedding engine
pub struct BatchEmbedder {
    factory: Arc<dyn EmbedderFactory>,
    batch_size: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl BatchEmbedder {
    pub fn new(config: EmbedderConfig) -> Self {
        Self::with_factory(Arc::new(config))
    }

    /// Build from any factory; tests inject scripted embedders here.
    pub fn with_factory(factory: Arc<dyn EmbedderFactory>) -> Self {
        Self {
            factory,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Build a standalone embedder from the factory for single-item calls
    /// (summaries, image descriptions, query embeddings).
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.factory.build()
    }

    /// Embed a list of texts, preserving positions: invalid inputs (empty
    /// or whitespace-only) map to `None`, valid inputs to `Some`.
    ///
    /// Valid texts are partitioned into batches of `batch_size`; one worker
    /// per batch, bounded by `min(num_batches, available_parallelism)`.
    /// Workers process their batch sequentially with rate-limit backoff;
    /// the first unrecoverable failure aborts the whole operation.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Embedding>>> {
        let mut results: Vec<Option<Embedding>> = (0..texts.len()).map(|_| None).collect();

        let valid: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                let t = t.trim();
                (!t.is_empty()).then(|| (i, t.to_string()))
            })
            .collect();

        if valid.is_empty() {
            tracing::warn!(total = texts.len(), "no valid texts to embed");
            return Ok(results);
        }

        let batches: Vec<Vec<(usize, String)>> = valid
            .chunks(self.batch_size)
            .map(|batch| batch.to_vec())
            .collect();
        let workers = available_parallelism().min(batches.len());

        tracing::debug!(
            total = texts.len(),
            valid = valid.len(),
            batches = batches.len(),
            workers,
            "starting batch embedding"
        );

        let factory = Arc::clone(&self.factory);
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;

        let worker_outputs: Vec<Vec<(usize, Embedding)>> = stream::iter(
            batches.into_iter().map(|batch| {
                let factory = Arc::clone(&factory);
                async move {
                    let embedder = factory.build()?;
                    let mut out = Vec::with_capacity(batch.len());
                    for (index, text) in batch {
                        let embedding =
                            embed_with_retry(embedder.as_ref(), &text, max_retries, retry_delay)
                                .await?;
                        out.push((index, embedding));
                    }
                    Ok::<_, VellumError>(out)
                }
            }),
        )
        .buffered(workers)
        .try_collect()
        .await?;

        let mut succeeded = 0usize;
        for output in worker_outputs {
            for (index, embedding) in output {
                results[index] = Some(embedding);
                succeeded += 1;
            }
        }

        tracing::info!(
            total = texts.len(),
            succeeded,
            skipped = texts.len() - succeeded,
            "batch embedding completed"
        );

        Ok(results)
    }

    /// Embed chunks with partial-failure tolerance. Failed chunks are
    /// dropped together with their metadata; when failures exceed
    /// `max_acceptable_loss × total` the whole call aborts.
    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        max_acceptable_loss: f64,
    ) -> Result<Vec<EmbeddedChunk>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let total = chunks.len();
        let max_failures = (max_acceptable_loss * total as f64).floor() as usize;
        let embedder = self.factory.build()?;

        let mut embedded = Vec::with_capacity(total);
        let mut failed = 0usize;

        for (index, chunk) in chunks.iter().enumerate() {
            match embedder.embed(&chunk.text).await {
                Ok(embedding) => embedded.push(EmbeddedChunk {
                    chunk: chunk.clone(),
                    embedding,
                }),
                Err(error) => {
                    failed += 1;
                    tracing::warn!(
                        chunk_index = index,
                        %error,
                        "failed to embed chunk, dropping it"
                    );
                    if failed > max_failures {
                        return Err(VellumError::ChunkLossExceeded {
                            failed,
                            total,
                            max_loss: max_acceptable_loss * 100.0,
                        });
                    }
                }
            }
        }

        tracing::info!(
            total,
            embedded = embedded.len(),
            failed,
            "chunk embedding completed"
        );

        Ok(embedded)
    }
}

/// One embedding attempt with rate-limit backoff. Rate-limited calls sleep
/// `retry_delay` and retry up to `max_retries` attempts in total; other
/// errors surface immediately.
async fn embed_with_retry(
    embedder: &dyn Embedder,
    text: &str,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<Embedding> {
    for attempt in 1..=max_retries {
        match embedder.embed(text).await {
            Ok(embedding) => return Ok(embedding),
            Err(VellumError::RateLimited(message)) => {
                if attempt < max_retries {
                    tracing::warn!(
                        attempt,
                        max_retries,
                        delay_secs = retry_delay.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(retry_delay).await;
                } else {
                    return Err(VellumError::Embedding(format!(
                        "rate limit persisted after {} attempts: {}",
                        max_retries, message
                    )));
                }
            }
            Err(error) => return Err(error),
        }
    }
    unreachable!("retry loop always returns")
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
