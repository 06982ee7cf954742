//! Storage collaborator: the database of record for documents and chunks.
//!
//! The retrieval core only needs the narrow [`ChunkStorage`] interface.
//! [`MemoryStorage`] implements it in memory, optionally mirrored to a JSON
//! file so local tools keep their corpus between runs.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use docindex_embeddings::Embedding;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::models::{Chunk, ChunkId, Document, DocumentStatus, NewChunk};

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Database of record for documents and their chunks.
///
/// Chunk ids are assigned by the storage on insert and never reused.
/// "Storage order" below means the order a backend naturally returns rows in;
/// for [`MemoryStorage`] that is ascending chunk id.
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    /// Insert or replace a document record.
    async fn put_document(&self, document: Document) -> StorageResult<()>;

    /// Fetch a document by id.
    async fn document(&self, id: &str) -> StorageResult<Option<Document>>;

    /// All documents, newest first.
    async fn documents(&self) -> StorageResult<Vec<Document>>;

    /// Update a document's processing status.
    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> StorageResult<()>;

    /// Delete a document and every chunk it owns. Returns the chunk count removed.
    async fn delete_document(&self, id: &str) -> StorageResult<usize>;

    /// Persist chunks for an existing document, returning their ids in input order.
    async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> StorageResult<Vec<ChunkId>>;

    /// Every `(id, embedding)` pair with a non-empty embedding, in storage order.
    async fn chunk_embeddings(&self) -> StorageResult<Vec<(ChunkId, Embedding)>>;

    /// Like [`ChunkStorage::chunk_embeddings`], restricted to the given documents.
    async fn chunk_embeddings_for(
        &self,
        document_ids: &[String],
    ) -> StorageResult<Vec<(ChunkId, Embedding)>>;

    /// Ids of the documents in a batch. Unknown batches yield an empty list.
    async fn document_ids_for_batch(&self, batch_id: &str) -> StorageResult<Vec<String>>;

    /// Full chunk records for the given ids, in the requested order.
    ///
    /// Ids that no longer exist are skipped.
    async fn chunks_by_ids(&self, ids: &[ChunkId]) -> StorageResult<Vec<Chunk>>;

    /// Case-insensitive substring match on chunk content, in storage order.
    async fn text_search(&self, query: &str, limit: usize) -> StorageResult<Vec<Chunk>>;
}

/// Serializable contents of a [`MemoryStorage`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_chunk_id: ChunkId,
    documents: BTreeMap<String, Document>,
    chunks: BTreeMap<ChunkId, Chunk>,
}

impl StoreState {
    fn embedded_pairs<'a>(
        &'a self,
        keep: impl Fn(&Chunk) -> bool + 'a,
    ) -> impl Iterator<Item = (ChunkId, Embedding)> + 'a {
        self.chunks.values().filter(move |c| keep(c)).filter_map(|c| {
            c.embedding
                .as_ref()
                .filter(|e| !e.is_empty())
                .map(|e| (c.id, e.clone()))
        })
    }
}

/// In-memory storage with optional JSON file persistence.
pub struct MemoryStorage {
    state: RwLock<StoreState>,

    /// Backing file, rewritten after every mutation.
    path: Option<PathBuf>,
}

impl MemoryStorage {
    /// Create an empty, purely in-memory store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_chunk_id: 1,
                ..StoreState::default()
            }),
            path: None,
        }
    }

    /// Open a store backed by a JSON file, loading it if it exists.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if fs::try_exists(&path).await.unwrap_or(false) {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?;
            let state: StoreState = serde_json::from_str(&content)
                .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?;
            info!(
                "Loaded {} documents and {} chunks from {}",
                state.documents.len(),
                state.chunks.len(),
                path.display()
            );
            state
        } else {
            StoreState {
                next_chunk_id: 1,
                ..StoreState::default()
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Write the state to the backing file, if any.
    async fn save(&self, state: &StoreState) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::WriteFile(format!("{}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string(state)
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;

        // Write atomically using a temp file
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;

        debug!("Saved store to {}", path.display());
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStorage for MemoryStorage {
    async fn put_document(&self, document: Document) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.documents.insert(document.id.clone(), document);
        self.save(&state).await
    }

    async fn document(&self, id: &str) -> StorageResult<Option<Document>> {
        Ok(self.state.read().await.documents.get(id).cloned())
    }

    async fn documents(&self) -> StorageResult<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state.documents.values().cloned().collect();
        documents.sort_by_key(|d| Reverse(d.created_at));
        Ok(documents)
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .get_mut(id)
            .ok_or_else(|| StorageError::DocumentNotFound(id.to_string()))?;
        document.status = status;
        document.updated_at = Some(Utc::now());
        self.save(&state).await
    }

    async fn delete_document(&self, id: &str) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        if state.documents.remove(id).is_none() {
            return Err(StorageError::DocumentNotFound(id.to_string()));
        }

        let before = state.chunks.len();
        state.chunks.retain(|_, chunk| chunk.document_id != id);
        let removed = before - state.chunks.len();

        self.save(&state).await?;
        info!("Deleted document {id} and {removed} chunks");
        Ok(removed)
    }

    async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> StorageResult<Vec<ChunkId>> {
        let mut state = self.state.write().await;

        if let Some(missing) = chunks
            .iter()
            .find(|c| !state.documents.contains_key(&c.document_id))
        {
            return Err(StorageError::DocumentNotFound(missing.document_id.clone()));
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = state.next_chunk_id;
            state.next_chunk_id += 1;
            state.chunks.insert(id, chunk.into_chunk(id));
            ids.push(id);
        }

        self.save(&state).await?;
        debug!("Inserted {} chunks", ids.len());
        Ok(ids)
    }

    async fn chunk_embeddings(&self) -> StorageResult<Vec<(ChunkId, Embedding)>> {
        let state = self.state.read().await;
        Ok(state.embedded_pairs(|_| true).collect())
    }

    async fn chunk_embeddings_for(
        &self,
        document_ids: &[String],
    ) -> StorageResult<Vec<(ChunkId, Embedding)>> {
        let wanted: HashSet<&str> = document_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .embedded_pairs(|c| wanted.contains(c.document_id.as_str()))
            .collect())
    }

    async fn document_ids_for_batch(&self, batch_id: &str) -> StorageResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.batch_id.as_deref() == Some(batch_id))
            .map(|d| d.id.clone())
            .collect())
    }

    async fn chunks_by_ids(&self, ids: &[ChunkId]) -> StorageResult<Vec<Chunk>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.chunks.get(id).cloned())
            .collect())
    }

    async fn text_search(&self, query: &str, limit: usize) -> StorageResult<Vec<Chunk>> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .chunks
            .values()
            .filter(|c| c.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }
}
