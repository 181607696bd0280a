//! Environment-driven configuration
//!
//! Credentials, store coordinates, collection names, and model identifiers
//! are read from process env. Every knob has a default so a memory-backed
//! pipeline works with no environment at all. `.env` files are supported
//! through [`load_dotenv`] for development.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbedderConfig;
use crate::error::{Result, VellumError};
use crate::ingest::DedupPolicy;
use crate::search::StrategyKind;
use crate::store::{IndexKind, MemoryStore, MilvusStore, VectorStore};

/// Load a `.env` file if one exists. Call once at startup, before
/// [`VellumConfig::from_env`].
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Which vector store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Milvus,
}

impl std::str::FromStr for StoreBackend {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "milvus" => Ok(StoreBackend::Milvus),
            _ => Err(VellumError::Config(format!(
                "Unknown store backend '{}'. Supported: memory, milvus",
                s
            ))),
        }
    }
}

/// Vector store coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub url: String,
    pub token: Option<String>,
    pub database: String,
    pub collection_documents: String,
    pub collection_summaries: String,
    pub index: IndexKind,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "http://localhost:19530".to_string(),
            token: None,
            database: "default".to_string(),
            collection_documents: "documents".to_string(),
            collection_summaries: "summaries".to_string(),
            index: IndexKind::default(),
        }
    }
}

impl StoreSettings {
    /// Open the documents and summaries collection handles
    pub fn open_stores(&self) -> (Arc<dyn VectorStore>, Arc<dyn VectorStore>) {
        match self.backend {
            StoreBackend::Memory => (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryStore::new()),
            ),
            StoreBackend::Milvus => (
                Arc::new(MilvusStore::new(
                    &self.url,
                    self.token.clone(),
                    &self.database,
                    &self.collection_documents,
                )),
                Arc::new(MilvusStore::new(
                    &self.url,
                    self.token.clone(),
                    &self.database,
                    &self.collection_summaries,
                )),
            ),
        }
    }
}

/// Ingestion knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    pub detect_chapters: bool,
    pub process_images: bool,
    pub max_acceptable_loss: f64,
    pub dedup: DedupPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap: 0,
            detect_chapters: true,
            process_images: false,
            max_acceptable_loss: 0.10,
            dedup: DedupPolicy::Allow,
        }
    }
}

/// Search knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub strategy: StrategyKind,
    pub limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Simple,
            limit: crate::search::DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Provider credentials and model identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub openai_api_key: Option<String>,
    /// "openai" or "tfidf"
    pub embedding_provider: String,
    pub embedding_model: String,
    pub tfidf_dimensions: usize,
    pub text_model: Option<String>,
    pub vision_model: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            embedding_provider: "openai".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            tfidf_dimensions: 384,
            text_model: None,
            vision_model: None,
        }
    }
}

impl ModelSettings {
    /// Resolve the embedder configuration; the OpenAI provider fails fast
    /// without a key.
    pub fn embedder_config(&self) -> Result<EmbedderConfig> {
        match self.embedding_provider.as_str() {
            "openai" => {
                let api_key = self.openai_api_key.clone().ok_or_else(|| {
                    VellumError::Config(
                        "OPENAI_API_KEY is required for the openai embedding provider".to_string(),
                    )
                })?;
                Ok(EmbedderConfig::OpenAi {
                    api_key,
                    model: self.embedding_model.clone(),
                    base_url: None,
                })
            }
            "tfidf" => Ok(EmbedderConfig::TfIdf {
                dimensions: self.tfidf_dimensions,
            }),
            other => Err(VellumError::Config(format!(
                "Unknown embedding provider '{}'. Supported: openai, tfidf",
                other
            ))),
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VellumConfig {
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    pub search: SearchSettings,
    pub models: ModelSettings,
}

impl VellumConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function (testable form)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store = StoreSettings {
            backend: parse_or(&lookup, "VELLUM_STORE_BACKEND", StoreBackend::Memory)?,
            url: string_or(&lookup, "VELLUM_STORE_URL", "http://localhost:19530"),
            token: lookup("VELLUM_STORE_TOKEN"),
            database: string_or(&lookup, "VELLUM_DATABASE", "default"),
            collection_documents: string_or(&lookup, "VELLUM_COLLECTION_DOCUMENTS", "documents"),
            collection_summaries: string_or(&lookup, "VELLUM_COLLECTION_SUMMARIES", "summaries"),
            index: parse_or(&lookup, "VELLUM_INDEX", IndexKind::default())?,
        };

        let ingest = IngestSettings {
            chunk_size: number_or(&lookup, "VELLUM_CHUNK_SIZE", 2000)?,
            overlap: number_or(&lookup, "VELLUM_CHUNK_OVERLAP", 0)?,
            detect_chapters: bool_or(&lookup, "VELLUM_DETECT_CHAPTERS", true),
            process_images: bool_or(&lookup, "VELLUM_PROCESS_IMAGES", false),
            max_acceptable_loss: number_or(&lookup, "VELLUM_MAX_ACCEPTABLE_LOSS", 0.10)?,
            dedup: parse_or(&lookup, "VELLUM_DEDUP", DedupPolicy::Allow)?,
        };

        let search = SearchSettings {
            strategy: parse_or(&lookup, "VELLUM_SEARCH_STRATEGY", StrategyKind::Simple)?,
            limit: number_or(&lookup, "VELLUM_SEARCH_LIMIT", 10)?,
        };

        let defaults = ModelSettings::default();
        let models = ModelSettings {
            openai_api_key: lookup("OPENAI_API_KEY"),
            embedding_provider: string_or(
                &lookup,
                "VELLUM_EMBEDDING_PROVIDER",
                &defaults.embedding_provider,
            ),
            embedding_model: string_or(
                &lookup,
                "VELLUM_EMBEDDING_MODEL",
                &defaults.embedding_model,
            ),
            tfidf_dimensions: number_or(&lookup, "VELLUM_TFIDF_DIMENSIONS", 384)?,
            text_model: lookup("VELLUM_TEXT_MODEL"),
            vision_model: lookup("VELLUM_VISION_MODEL"),
        };

        Ok(Self {
            store,
            ingest,
            search,
            models,
        })
    }
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn number_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| VellumError::Config(format!("invalid value for {}: '{}'", key, value))),
        None => Ok(default),
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr<Err = VellumError>,
{
    match lookup(key) {
        Some(value) => value.trim().parse(),
        None => Ok(default),
    }
}
