//! # Retrieval
//!
//! Document chunking, ingestion and vector search for docindex:
//!
//! - **Ingestion**: split extracted text into overlapping chunks, embed them
//!   and persist them with their vectors
//! - **Index Manager**: a process-wide similarity index mirrored to disk,
//!   loaded lazily and rebuildable from storage at any time
//! - **Search**: global index search, scoped brute-force search over
//!   documents or batches, and a text fallback
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      RetrievalService                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ingest ──► Chunker ──► EmbeddingProvider ──► ChunkStorage     │
//! │                                                    │            │
//! │                                                    ▼            │
//! │                                  IndexManager ◄── add           │
//! │                                       │                         │
//! │                                       ▼                         │
//! │                                 SnapshotStore                   │
//! │                                                                 │
//! │   search ──► resolve scope                                      │
//! │                 ├── batch / documents ──► scoped search         │
//! │                 └── global ──► IndexManager ──► text fallback   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docindex_retrieval::{Document, RetrievalService, SearchRequest};
//!
//! let service = RetrievalService::builder()
//!     .with_data_dir("~/.local/share/docindex")
//!     .build()
//!     .await?;
//!
//! let document = Document::new("notes.md", "text/markdown", 1024);
//! service.ingest_document(document, &text).await?;
//!
//! let results = service
//!     .search_chunks(&SearchRequest::new("release checklist").with_k(5))
//!     .await?;
//! ```

pub mod chunker;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod ingest;
pub mod manager;
pub mod models;
pub mod scoped;
pub mod search;
pub mod snapshot;
pub mod storage;

pub use chunker::{ChunkerConfig, TextChunker, chunk_text};
pub use config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig, SearchConfig};
pub use engine::{
    DeleteReport, RetrievalService, RetrievalServiceBuilder, RetrievedChunk, SearchResults,
    provider_from_config,
};
pub use error::{Result, RetrievalError, StorageError};
pub use fallback::fallback_search;
pub use ingest::{IndexUpdate, IngestReport, IngestionPipeline};
pub use manager::{IndexManager, IndexState, IndexStatus};
pub use models::{Chunk, ChunkId, CitationLocator, Document, DocumentStatus, Modality, NewChunk};
pub use scoped::scoped_search;
pub use search::{Scope, SearchHit, SearchOutcome, SearchRequest, SearchStrategy};
pub use snapshot::{FsSnapshotStore, MemorySnapshotStore, SnapshotKey, SnapshotStore};
pub use storage::{ChunkStorage, MemoryStorage};

// Re-export from dependencies for convenience
pub use docindex_embeddings::{EmbeddingProvider, IndexKind, LocalProvider, OpenAIProvider};
