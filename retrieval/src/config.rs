//! Configuration for the retrieval service.
//!
//! Values come from defaults, then an optional TOML file, then environment
//! variables (`VECTOR_DIR`, `EMBEDDING_PROVIDER`, `EMBEDDING_MODEL`).

use std::path::{Path, PathBuf};

use docindex_embeddings::{DEFAULT_LOCAL_DIMENSION, IndexKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunker::ChunkerConfig;
use crate::error::{Result, RetrievalError};
use crate::ingest::DEFAULT_EMBED_BATCH_SIZE;

/// Configuration for the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Root directory for local state.
    pub data_dir: PathBuf,

    /// Directory holding the vector index snapshot. Defaults to
    /// `<data_dir>/vector_index`.
    pub index_dir: Option<PathBuf>,

    /// Similarity index backend.
    pub index_backend: IndexKind,

    /// Chunking configuration.
    pub chunking: ChunkerConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Query configuration.
    pub search: SearchConfig,

    /// Rebuild the index after a document is deleted.
    pub rebuild_on_delete: bool,
}

impl RetrievalConfig {
    /// Create a configuration rooted at `data_dir` with default values.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index_dir: None,
            index_backend: IndexKind::default(),
            chunking: ChunkerConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            rebuild_on_delete: true,
        }
    }

    /// Load from an optional TOML file, apply environment overrides and validate.
    ///
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text. Omitted fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("VECTOR_DIR") {
            self.index_dir = Some(PathBuf::from(dir));
        }
        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            self.embedding.provider = match provider.to_ascii_lowercase().as_str() {
                "openai" => EmbeddingProviderType::OpenAI,
                "local" => EmbeddingProviderType::Local,
                other => {
                    return Err(RetrievalError::Config(format!(
                        "unknown embedding provider: {other}"
                    )));
                }
            };
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }
        Ok(())
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(RetrievalError::Config(
                "chunking.chunk_size must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RetrievalError::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProviderType::Local && self.embedding.dimension == 0
        {
            return Err(RetrievalError::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.search.default_top_k == 0 {
            return Err(RetrievalError::Config(
                "search.default_top_k must be positive".to_string(),
            ));
        }
        if self.search.max_top_k == 0 {
            return Err(RetrievalError::Config(
                "search.max_top_k must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved snapshot directory.
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("vector_index"))
    }

    /// Path of the JSON document store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    /// Set the index backend.
    pub fn with_index_backend(mut self, kind: IndexKind) -> Self {
        self.index_backend = kind;
        self
    }

    /// Set the chunking configuration.
    pub fn with_chunking(mut self, config: ChunkerConfig) -> Self {
        self.chunking = config;
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(dirs::data_dir().unwrap_or_default().join("docindex"))
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to request (provider-specific).
    pub model: Option<String>,

    /// Override for the OpenAI-compatible API base URL.
    pub base_url: Option<String>,

    /// Texts per provider call.
    pub batch_size: usize,

    /// Output dimension of the local provider.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Local,
            model: None,
            base_url: None,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            dimension: DEFAULT_LOCAL_DIMENSION,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline hashing model.
    #[default]
    Local,
}

/// Configuration for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result count when a request does not give one.
    pub default_top_k: usize,

    /// Upper bound on the result count; larger requests are clamped.
    pub max_top_k: usize,
}

impl SearchConfig {
    /// Resolve a requested result count.
    pub fn effective_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_top_k).min(self.max_top_k)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 100,
        }
    }
}
