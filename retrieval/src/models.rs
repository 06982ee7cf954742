//! Documents and chunks as held by the storage collaborator.

use chrono::{DateTime, Utc};
use docindex_embeddings::{Embedding, VectorId};
use serde::{Deserialize, Serialize};

/// Identifier of a stored chunk.
pub type ChunkId = VectorId;

/// Kind of media a chunk was derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Text,
    Image,
    Video,
    Audio,
}

impl Modality {
    /// Classify by MIME type, falling back to `Text`.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Modality::Image
        } else if mime.starts_with("video/") {
            Modality::Video
        } else if mime.starts_with("audio/") {
            Modality::Audio
        } else {
            Modality::Text
        }
    }
}

/// Processing state of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Uploading,
    Processing,
    Ready,
    Failed,
}

/// Where inside its source a chunk came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationLocator {
    /// 1-based page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Video frame index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,

    /// Offset into audio or video, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

/// An uploaded document. Owns its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    /// Optional grouping searched as one unit.
    pub batch_id: Option<String>,

    pub name: String,

    pub mime_type: String,

    pub size_bytes: u64,

    pub status: DocumentStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Create a new document with a random id in the `Uploading` state.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: None,
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            status: DocumentStatus::Uploading,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Place the document in a batch.
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// A persisted, retrievable unit of document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,

    pub document_id: String,

    pub batch_id: Option<String>,

    pub content: String,

    pub modality: Modality,

    pub citation_locator: Option<CitationLocator>,

    /// Position within the owning document.
    pub chunk_index: u32,

    pub embedding: Option<Embedding>,
}

/// A chunk awaiting persistence. Storage assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub document_id: String,
    pub batch_id: Option<String>,
    pub content: String,
    pub modality: Modality,
    pub citation_locator: Option<CitationLocator>,
    pub chunk_index: u32,
    pub embedding: Option<Embedding>,
}

impl NewChunk {
    /// Attach the storage-assigned id.
    pub fn into_chunk(self, id: ChunkId) -> Chunk {
        Chunk {
            id,
            document_id: self.document_id,
            batch_id: self.batch_id,
            content: self.content,
            modality: self.modality,
            citation_locator: self.citation_locator,
            chunk_index: self.chunk_index,
            embedding: self.embedding,
        }
    }
}
