//! Owner of the process-wide similarity index.
//!
//! [`IndexManager`] holds the in-memory snapshot and mirrors it to a
//! [`SnapshotStore`]. Every operation takes the same async mutex, so a search
//! never observes a half-applied rebuild or add.
//!
//! ```text
//! Uninitialized ──load_or_build──▶ Loaded | Built | Empty
//!        │                              │
//!        └──────────rebuild─────────────┴──▶ Rebuilt | Empty
//!                                       │
//!                                      add ──▶ Extended
//! ```
//!
//! The snapshot is a cache of the storage's `(chunk id, embedding)` pairs. A
//! missing or corrupt mirror is rebuilt from storage, never served as empty.

use std::sync::Arc;

use docindex_embeddings::{
    Embedding, IndexKind, ScoredId, SimilarityIndex, index_from_parts, new_index,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, RetrievalError};
use crate::models::ChunkId;
use crate::snapshot::{self, SnapshotKey, SnapshotStore};
use crate::storage::ChunkStorage;

/// Lifecycle state of the managed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// No load has been attempted yet.
    Uninitialized,
    /// Storage held no embedded chunks when last consulted.
    Empty,
    /// Restored from the on-disk snapshot.
    Loaded,
    /// Built from storage because no usable snapshot existed.
    Built,
    /// Rebuilt from storage on request.
    Rebuilt,
    /// Grown by incremental adds since the last load or build.
    Extended,
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub backend: IndexKind,
    pub entries: usize,
    pub dimension: Option<usize>,

    /// The on-disk mirror lags the in-memory index.
    pub dirty: bool,
}

struct Inner {
    state: IndexState,

    /// Present exactly when `state` is Loaded, Built, Rebuilt or Extended.
    index: Option<Box<dyn SimilarityIndex>>,

    dirty: bool,
}

/// Manages the global similarity index and its on-disk mirror.
pub struct IndexManager {
    kind: IndexKind,
    snapshots: Arc<dyn SnapshotStore>,
    inner: Mutex<Inner>,
}

impl IndexManager {
    /// Create a manager in the `Uninitialized` state.
    pub fn new(kind: IndexKind, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            kind,
            snapshots,
            inner: Mutex::new(Inner {
                state: IndexState::Uninitialized,
                index: None,
                dirty: false,
            }),
        }
    }

    /// Backend used for every index this manager builds or loads.
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Load the on-disk snapshot, or build one from storage.
    ///
    /// Does nothing once the manager has left `Uninitialized`, including when
    /// a previous attempt found storage empty.
    pub async fn load_or_build(&self, storage: &dyn ChunkStorage) -> Result<IndexStatus> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner, storage).await?;
        Ok(self.status_of(&inner))
    }

    /// Re-derive the index from storage, ignoring the on-disk snapshot.
    ///
    /// This is the only operation that can shrink the index.
    pub async fn rebuild(&self, storage: &dyn ChunkStorage) -> Result<IndexStatus> {
        let mut inner = self.inner.lock().await;

        let pairs = storage.chunk_embeddings().await?;
        let index = build_index(self.kind, pairs)?;

        match &index {
            Some(index) => info!(
                "Rebuilt vector index: {} entries, dimension {}",
                index.len(),
                index.dimension()
            ),
            None => info!("Rebuilt vector index: storage holds no embeddings"),
        }

        inner.state = if index.is_some() {
            IndexState::Rebuilt
        } else {
            IndexState::Empty
        };
        inner.index = index;
        self.persist(&mut inner).await;

        Ok(self.status_of(&inner))
    }

    /// Append freshly persisted `(chunk id, embedding)` pairs.
    ///
    /// Loads or builds first if needed. Ids already indexed are skipped, so
    /// rows picked up by that load are not added twice. Returns how many
    /// vectors were appended. A failed snapshot write does not fail the add;
    /// the manager stays dirty and retries on the next write.
    pub async fn add(
        &self,
        pairs: Vec<(ChunkId, Embedding)>,
        storage: &dyn ChunkStorage,
    ) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner, storage).await?;

        let (ids, vectors): (Vec<ChunkId>, Vec<Embedding>) =
            pairs.into_iter().filter(|(_, v)| !v.is_empty()).unzip();
        if ids.is_empty() {
            if inner.dirty {
                self.persist(&mut inner).await;
            }
            return Ok(0);
        }

        let appended = match inner.index.as_mut() {
            Some(index) => index.add(&ids, &vectors).map_err(RetrievalError::from_index)?,
            None => {
                let mut index = new_index(self.kind, vectors[0].len())
                    .map_err(RetrievalError::from_index)?;
                let appended = index
                    .add(&ids, &vectors)
                    .map_err(RetrievalError::from_index)?;
                inner.index = Some(index);
                appended
            }
        };

        if appended < ids.len() {
            debug!("Skipped {} already indexed ids", ids.len() - appended);
        }

        if appended > 0 {
            inner.state = IndexState::Extended;
            self.persist(&mut inner).await;
        } else if inner.dirty {
            self.persist(&mut inner).await;
        }

        Ok(appended)
    }

    /// Top `k` chunk ids by cosine similarity to `query`, best first.
    ///
    /// An uninitialized or empty manager yields an empty ranking. A query
    /// whose length differs from the indexed dimension is an error.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        let inner = self.inner.lock().await;
        let Some(index) = inner.index.as_ref() else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        index.search(query, k).map_err(RetrievalError::from_index)
    }

    /// Current state, size and dimension.
    pub async fn status(&self) -> IndexStatus {
        let inner = self.inner.lock().await;
        self.status_of(&inner)
    }

    /// Retry a snapshot write that failed earlier.
    pub async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.dirty {
            return Ok(());
        }
        self.write_mirror(&inner).await?;
        inner.dirty = false;
        Ok(())
    }

    async fn ensure_loaded(&self, inner: &mut Inner, storage: &dyn ChunkStorage) -> Result<()> {
        if inner.state != IndexState::Uninitialized {
            return Ok(());
        }

        match snapshot::read_snapshot(self.snapshots.as_ref()).await {
            Ok(Some(parts)) if !parts.ids.is_empty() => {
                match index_from_parts(self.kind, parts.dimension, parts.ids, parts.vectors) {
                    Ok(index) => {
                        info!(
                            "Loaded vector index snapshot: {} entries, dimension {}",
                            index.len(),
                            index.dimension()
                        );
                        inner.index = Some(index);
                        inner.state = IndexState::Loaded;
                        return Ok(());
                    }
                    Err(e) => warn!("Vector index snapshot unusable, rebuilding: {e}"),
                }
            }
            Ok(Some(_)) => debug!("Vector index snapshot is empty, building from storage"),
            Ok(None) => debug!("No vector index snapshot, building from storage"),
            Err(e) => warn!("Vector index snapshot unreadable, rebuilding: {e}"),
        }

        let pairs = storage.chunk_embeddings().await?;
        let index = build_index(self.kind, pairs)?;
        match &index {
            Some(index) => info!(
                "Built vector index from storage: {} entries, dimension {}",
                index.len(),
                index.dimension()
            ),
            None => info!("No embedded chunks in storage, vector index is empty"),
        }

        inner.state = if index.is_some() {
            IndexState::Built
        } else {
            IndexState::Empty
        };
        inner.index = index;
        self.persist(inner).await;
        Ok(())
    }

    /// Mirror the in-memory state, downgrading failure to a dirty flag.
    ///
    /// On failure the metadata artifact is removed so that a restart sees an
    /// incomplete snapshot and rebuilds from storage instead of loading the
    /// previous, stale one.
    async fn persist(&self, inner: &mut Inner) {
        match self.write_mirror(inner).await {
            Ok(()) => inner.dirty = false,
            Err(e) => {
                warn!("Failed to persist vector index snapshot: {e}");
                inner.dirty = true;
                if let Err(e) = self.snapshots.remove(SnapshotKey::Metadata).await {
                    warn!("Could not invalidate stale vector index snapshot: {e}");
                }
            }
        }
    }

    async fn write_mirror(&self, inner: &Inner) -> Result<()> {
        match inner.index.as_ref() {
            Some(index) => snapshot::write_snapshot(self.snapshots.as_ref(), index.as_ref()).await,
            None => snapshot::clear_snapshot(self.snapshots.as_ref()).await,
        }
    }

    fn status_of(&self, inner: &Inner) -> IndexStatus {
        IndexStatus {
            state: inner.state,
            backend: self.kind,
            entries: inner.index.as_ref().map_or(0, |index| index.len()),
            dimension: inner.index.as_ref().map(|index| index.dimension()),
            dirty: inner.dirty,
        }
    }
}

/// Build an index from storage rows.
///
/// The dimension is taken from the first non-empty vector; rows of any other
/// length are skipped with a warning. Returns `None` when nothing is left.
fn build_index(
    kind: IndexKind,
    pairs: Vec<(ChunkId, Embedding)>,
) -> Result<Option<Box<dyn SimilarityIndex>>> {
    let Some(dimension) = pairs.iter().map(|(_, v)| v.len()).find(|&len| len > 0) else {
        return Ok(None);
    };

    let (ids, vectors): (Vec<ChunkId>, Vec<Embedding>) = pairs
        .into_iter()
        .filter(|(id, v)| {
            let keep = v.len() == dimension;
            if !keep && !v.is_empty() {
                warn!(
                    "Skipping chunk {id}: embedding has {} values, index uses {dimension}",
                    v.len()
                );
            }
            keep
        })
        .unzip();

    let mut index = new_index(kind, dimension).map_err(RetrievalError::from_index)?;
    index.add(&ids, &vectors).map_err(RetrievalError::from_index)?;
    Ok(Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Modality, NewChunk};
    use crate::snapshot::{FsSnapshotStore, MemorySnapshotStore};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    async fn storage_with(vectors: Vec<Vec<f32>>) -> (MemoryStorage, Vec<ChunkId>) {
        let storage = MemoryStorage::new();
        storage
            .put_document(Document::new("doc.txt", "text/plain", 1).with_id("doc"))
            .await
            .unwrap();
        let ids = insert(&storage, vectors).await;
        (storage, ids)
    }

    async fn insert(storage: &MemoryStorage, vectors: Vec<Vec<f32>>) -> Vec<ChunkId> {
        let chunks = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| NewChunk {
                document_id: "doc".to_string(),
                batch_id: None,
                content: format!("chunk {i}"),
                modality: Modality::Text,
                citation_locator: None,
                chunk_index: i as u32,
                embedding: Some(v),
            })
            .collect();
        storage.insert_chunks(chunks).await.unwrap()
    }

    fn manager(snapshots: Arc<dyn SnapshotStore>) -> IndexManager {
        IndexManager::new(IndexKind::Exact, snapshots)
    }

    /// Snapshot store whose writes fail until switched on.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySnapshotStore,
        healthy: AtomicBool,
    }

    #[async_trait]
    impl SnapshotStore for FlakyStore {
        async fn read(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>> {
            self.inner.read(key).await
        }

        async fn write(&self, key: SnapshotKey, bytes: &[u8]) -> Result<()> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(RetrievalError::Persistence("disk full".to_string()));
            }
            self.inner.write(key, bytes).await
        }

        async fn remove(&self, key: SnapshotKey) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_search_before_load_is_empty() {
        let manager = manager(Arc::new(MemorySnapshotStore::new()));
        assert!(manager.search(&[1.0, 0.0], 3).await.unwrap().is_empty());
        assert_eq!(manager.status().await.state, IndexState::Uninitialized);
    }

    #[tokio::test]
    async fn test_build_then_search() {
        let (storage, ids) =
            storage_with(vec![vec![0.9, 0.1], vec![0.1, 0.9], vec![0.5, 0.5]]).await;
        let manager = manager(Arc::new(MemorySnapshotStore::new()));

        let status = manager.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Built);
        assert_eq!(status.entries, 3);
        assert_eq!(status.dimension, Some(2));

        let hits = manager.search(&[1.0, 0.0], 2).await.unwrap();
        let hit_ids: Vec<ChunkId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(hit_ids, vec![ids[0], ids[2]]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_added_vector_is_its_own_top_hit() {
        let (storage, _) = storage_with(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).await;
        let manager = manager(Arc::new(MemorySnapshotStore::new()));
        manager.load_or_build(&storage).await.unwrap();

        let new_ids = insert(&storage, vec![vec![0.2, 0.3, 0.9]]).await;
        let appended = manager
            .add(vec![(new_ids[0], vec![0.2, 0.3, 0.9])], &storage)
            .await
            .unwrap();
        assert_eq!(appended, 1);
        assert_eq!(manager.status().await.state, IndexState::Extended);

        let hits = manager.search(&[0.2, 0.3, 0.9], 1).await.unwrap();
        assert_eq!(hits[0].id, new_ids[0]);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_add_on_uninitialized_manager_does_not_duplicate() {
        let (storage, ids) = storage_with(vec![vec![1.0, 0.0]]).await;
        let manager = manager(Arc::new(MemorySnapshotStore::new()));

        // The implicit build already picks up the new row.
        let appended = manager
            .add(vec![(ids[0], vec![1.0, 0.0])], &storage)
            .await
            .unwrap();
        assert_eq!(appended, 0);
        assert_eq!(manager.status().await.entries, 1);
    }

    #[tokio::test]
    async fn test_empty_storage_is_remembered() {
        let storage = MemoryStorage::new();
        storage
            .put_document(Document::new("doc.txt", "text/plain", 1).with_id("doc"))
            .await
            .unwrap();
        let manager = manager(Arc::new(MemorySnapshotStore::new()));

        let status = manager.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Empty);

        // Rows written behind the manager's back are not picked up by another load.
        insert(&storage, vec![vec![1.0, 0.0]]).await;
        let status = manager.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Empty);
        assert!(manager.search(&[1.0, 0.0], 5).await.unwrap().is_empty());

        let status = manager.rebuild(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Rebuilt);
        assert_eq!(status.entries, 1);
    }

    #[tokio::test]
    async fn test_add_into_empty_index_sets_dimension() {
        let storage = MemoryStorage::new();
        let manager = manager(Arc::new(MemorySnapshotStore::new()));
        manager.load_or_build(&storage).await.unwrap();

        manager
            .add(vec![(7, vec![0.0, 3.0, 4.0])], &storage)
            .await
            .unwrap();
        let status = manager.status().await;
        assert_eq!(status.state, IndexState::Extended);
        assert_eq!(status.dimension, Some(3));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_is_an_error() {
        let (storage, _) = storage_with(vec![vec![1.0, 0.0, 0.0]]).await;
        let manager = manager(Arc::new(MemorySnapshotStore::new()));
        manager.load_or_build(&storage).await.unwrap();

        assert!(matches!(
            manager.search(&[1.0, 0.0], 1).await,
            Err(RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_rebuild_then_fresh_load_matches_storage() {
        let temp_dir = TempDir::new().unwrap();
        let (storage, ids) =
            storage_with(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).await;

        let first = manager(Arc::new(FsSnapshotStore::new(temp_dir.path())));
        first.rebuild(&storage).await.unwrap();

        // A fresh manager over the same directory models a process restart.
        let second = manager(Arc::new(FsSnapshotStore::new(temp_dir.path())));
        let status = second.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Loaded);

        let hits = second.search(&[1.0, 0.5], 10).await.unwrap();
        let indexed: HashSet<ChunkId> = hits.iter().map(|h| h.id).collect();
        let stored: HashSet<ChunkId> = ids.into_iter().collect();
        assert_eq!(indexed, stored);
    }

    #[tokio::test]
    async fn test_rebuild_shrinks_after_delete() {
        let (storage, _) = storage_with(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).await;
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let manager = manager(snapshots.clone());
        manager.load_or_build(&storage).await.unwrap();

        storage.delete_document("doc").await.unwrap();
        let status = manager.rebuild(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Empty);
        assert_eq!(status.entries, 0);
        assert!(snapshots.read(SnapshotKey::Payload).await.unwrap().is_none());
        assert!(snapshots.read(SnapshotKey::Metadata).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_triggers_build() {
        let (storage, _) = storage_with(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).await;
        let snapshots = Arc::new(MemorySnapshotStore::new());
        snapshots
            .write(SnapshotKey::Payload, b"garbage")
            .await
            .unwrap();
        snapshots
            .write(SnapshotKey::Metadata, b"{\"ids\":[1],\"dimension\":2,\"checksum\":\"x\"}")
            .await
            .unwrap();

        let manager = manager(snapshots.clone());
        let status = manager.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Built);
        assert_eq!(status.entries, 2);

        // The rebuilt snapshot replaced the corrupt one.
        let parts = snapshot::read_snapshot(snapshots.as_ref()).await.unwrap().unwrap();
        assert_eq!(parts.ids.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_persist_is_retried() {
        let (storage, ids) = storage_with(vec![vec![1.0, 0.0]]).await;
        let snapshots = Arc::new(FlakyStore::default());
        let manager = manager(snapshots.clone());

        let status = manager.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Built);
        assert!(status.dirty);
        assert_eq!(manager.search(&[1.0, 0.0], 1).await.unwrap()[0].id, ids[0]);

        assert!(manager.flush().await.is_err());
        snapshots.healthy.store(true, Ordering::SeqCst);
        manager.flush().await.unwrap();

        assert!(!manager.status().await.dirty);
        assert!(snapshot::read_snapshot(snapshots.as_ref()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restart_after_failed_persist_rebuilds() {
        let (storage, first_ids) = storage_with(vec![vec![1.0, 0.0]]).await;
        let snapshots = Arc::new(FlakyStore::default());
        snapshots.healthy.store(true, Ordering::SeqCst);

        let first = manager(snapshots.clone());
        first.load_or_build(&storage).await.unwrap();
        assert!(!first.status().await.dirty);

        snapshots.healthy.store(false, Ordering::SeqCst);
        let new_ids = insert(&storage, vec![vec![0.0, 1.0]]).await;
        first
            .add(vec![(new_ids[0], vec![0.0, 1.0])], &storage)
            .await
            .unwrap();
        assert!(first.status().await.dirty);
        snapshots.healthy.store(true, Ordering::SeqCst);

        // The process dies before a flush; the next one must not trust the
        // snapshot written before the failed update.
        let second = manager(snapshots.clone());
        let status = second.load_or_build(&storage).await.unwrap();
        assert_eq!(status.state, IndexState::Built);
        assert_eq!(status.entries, 2);

        let hits = second.search(&[0.0, 1.0], 10).await.unwrap();
        let indexed: HashSet<ChunkId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(indexed, HashSet::from([first_ids[0], new_ids[0]]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_searches_never_observe_partial_updates() {
        let (storage, _) = storage_with(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).await;
        let storage = Arc::new(storage);
        let manager = Arc::new(manager(Arc::new(MemorySnapshotStore::new())));
        manager.load_or_build(&*storage).await.unwrap();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    let hits = manager.search(&[0.6, 0.8], 5).await.unwrap();
                    assert!(hits.len() <= 5);
                    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
                    seen.extend(hits.into_iter().map(|h| h.id));
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let writer = {
            let manager = Arc::clone(&manager);
            let storage = Arc::clone(&storage);
            tokio::spawn(async move {
                for i in 0..40u32 {
                    let angle = i as f32 * 0.1;
                    let vector = vec![angle.cos(), angle.sin()];
                    let ids = insert(&storage, vec![vector.clone()]).await;
                    manager
                        .add(vec![(ids[0], vector)], &*storage)
                        .await
                        .unwrap();
                    if i % 8 == 0 {
                        manager.rebuild(&*storage).await.unwrap();
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        let stored: HashSet<ChunkId> = storage
            .chunk_embeddings()
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for reader in readers {
            for id in reader.await.unwrap() {
                assert!(stored.contains(&id), "search returned unknown id {id}");
            }
        }
        assert_eq!(manager.status().await.entries, stored.len());
    }

    #[tokio::test]
    async fn test_build_skips_vectors_of_other_dimensions() {
        let (storage, ids) = storage_with(vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]).await;
        let manager = manager(Arc::new(MemorySnapshotStore::new()));

        let status = manager.load_or_build(&storage).await.unwrap();
        assert_eq!(status.entries, 1);
        assert_eq!(manager.search(&[0.0, 1.0], 5).await.unwrap()[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_parallel_backend_matches_exact() {
        let (storage, _) = storage_with(vec![
            vec![0.3, 0.9, 0.1],
            vec![1.0, 1.0, 1.0],
            vec![-1.0, 0.2, 0.0],
            vec![0.3, 0.9, 0.1],
        ])
        .await;
        let exact = IndexManager::new(IndexKind::Exact, Arc::new(MemorySnapshotStore::new()));
        let parallel = IndexManager::new(IndexKind::Parallel, Arc::new(MemorySnapshotStore::new()));
        exact.load_or_build(&storage).await.unwrap();
        parallel.load_or_build(&storage).await.unwrap();

        assert_eq!(parallel.status().await.backend, IndexKind::Parallel);
        assert_eq!(
            exact.search(&[0.3, 0.9, 0.1], 4).await.unwrap(),
            parallel.search(&[0.3, 0.9, 0.1], 4).await.unwrap()
        );
    }
}
