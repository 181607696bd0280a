//! Embedding generation
//!
//! Supports multiple embedding backends:
//! - OpenAI API (text-embedding-3-small and friends)
//! - TF-IDF fallback (no external dependencies)
//!
//! Embedders are reconstructible from a serializable [`EmbedderConfig`] so
//! batch workers can build their own provider client instead of sharing a
//! live instance across task boundaries.

mod batch;
mod tfidf;

pub use batch::{
    BatchEmbedder, EmbeddedChunk, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ACCEPTABLE_LOSS,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
};
pub use tfidf::TfIdfEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// Supported OpenAI embedding models and their vector dimensions.
/// The table is closed: unknown model names fail at construction.
pub const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// Look up the declared dimension for a model name
pub fn model_dimensions(model: &str) -> Result<usize> {
    MODEL_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dim)| *dim)
        .ok_or_else(|| {
            let supported: Vec<&str> = MODEL_DIMENSIONS.iter().map(|(n, _)| *n).collect();
            VellumError::Config(format!(
                "Unknown embedding model '{}'. Supported models: {}",
                model,
                supported.join(", ")
            ))
        })
}

/// A dense vector with the provider's token accounting, when available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub tokens: Option<u32>,
}

/// Trait for embedding generators
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single non-empty text
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Fixed output dimension of the configured model
    fn dimensions(&self) -> usize;

    /// Model name
    fn model_name(&self) -> &str;
}

/// Serializable embedder configuration. Each variant maps to one embedder
/// implementation; [`build_embedder`] is the factory half of the round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbedderConfig {
    OpenAi {
        api_key: String,
        model: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    TfIdf {
        dimensions: usize,
    },
}

/// Build a live embedder from its configuration
pub fn build_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    match config {
        EmbedderConfig::OpenAi {
            api_key,
            model,
            base_url,
        } => Ok(Arc::new(OpenAiEmbedder::new(
            api_key.clone(),
            model.clone(),
            base_url.clone(),
        )?)),
        EmbedderConfig::TfIdf { dimensions } => Ok(Arc::new(TfIdfEmbedder::new(*dimensions)?)),
    }
}

/// Factory used by batch workers to construct an embedder in-task.
/// [`EmbedderConfig`] is the production implementation.
pub trait EmbedderFactory: Send + Sync + 'static {
    fn build(&self) -> Result<Arc<dyn Embedder>>;
}

impl EmbedderFactory for EmbedderConfig {
    fn build(&self) -> Result<Arc<dyn Embedder>> {
        build_embedder(self)
    }
}

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI embedding client
#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create a client for a known model. Unknown models fail fast.
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(VellumError::Config(
                "OpenAI API key is required".to_string(),
            ));
        }
        let dimensions = model_dimensions(&model)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VellumError::InvalidInput(
                "text must be a non-empty string".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "input": text,
                "model": self.model,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VellumError::from_provider_response(status.as_u16(), &body));
        }

        let data: serde_json::Value = response.json().await?;
        let vector: Vec<f32> = data["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| VellumError::Embedding("Invalid response format".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.len() != self.dimensions {
            return Err(VellumError::Embedding(format!(
                "Expected {} dimensions, provider returned {}",
                self.dimensions,
                vector.len()
            )));
        }

        let tokens = data["usage"]["total_tokens"].as_u64().map(|t| t as u32);

        Ok(Embedding { vector, tokens })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
