//! # Embeddings
//!
//! Embedding generation and vector similarity for docindex.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors (OpenAI-compatible
//!   HTTP APIs, or a deterministic offline hashing model)
//! - **Similarity Math**: Normalization, cosine similarity and stable top-k
//! - **Similarity Index**: Flat vector indexes with interchangeable exact and
//!   parallel scan backends
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► SimilarityIndex            │
//! │       │                                   │                     │
//! │       ▼                                   ▼                     │
//! │  OpenAI/Local                     FlatIndex / ParallelIndex     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{
    FlatIndex, IndexKind, ParallelIndex, SimilarityIndex, VectorId, index_from_parts, new_index,
};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, LocalProvider, OpenAIProvider,
};
pub use similarity::{ScoredId, cosine_similarity, dot_product, normalize, normalized, top_k};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension produced by the local hashing provider unless configured otherwise.
pub const DEFAULT_LOCAL_DIMENSION: usize = 384;
