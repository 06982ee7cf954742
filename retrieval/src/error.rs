//! Error types for the retrieval subsystem.

use docindex_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval subsystem.
///
/// An empty ranking and an unknown batch are successful outcomes, not errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The embedding provider could not produce vectors.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[source] EmbeddingError),

    /// On-disk snapshot artifacts are unreadable or disagree with each other.
    #[error("index snapshot corrupt: {0}")]
    IndexCorrupt(String),

    /// Vector length disagrees with the indexed dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Storage collaborator failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Snapshot persistence failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Index operation failed for a reason other than dimension.
    #[error("index error: {0}")]
    Index(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether this error must reach the caller instead of triggering fallback.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RetrievalError::DimensionMismatch { .. } | RetrievalError::InvalidInput(_)
        )
    }

    /// Map an error raised by a similarity index.
    pub(crate) fn from_index(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, actual } => {
                RetrievalError::DimensionMismatch { expected, actual }
            }
            other => RetrievalError::Index(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        RetrievalError::EmbeddingUnavailable(err)
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Referenced document does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Failed to read the backing file.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write the backing file.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// Backing data could not be decoded.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Database error (for external backends).
    #[error("database error: {0}")]
    Database(String),
}
