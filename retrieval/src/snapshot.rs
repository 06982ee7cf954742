//! On-disk mirror of the similarity index.
//!
//! A snapshot is two artifacts stored under fixed keys:
//!
//! - the payload: a 16 byte header (`DXV1` magic, dimension as u32 LE,
//!   vector count as u64 LE) followed by the normalized vectors as `f32`
//!   in host byte order, row-major;
//! - the metadata: JSON `{ids, dimension, checksum}` where `checksum` is the
//!   SHA-256 of the payload.
//!
//! The payload is written first and the metadata last, so an interrupted
//! write leaves a checksum mismatch rather than a silently mixed snapshot.
//! Any missing half or disagreement decodes as [`RetrievalError::IndexCorrupt`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docindex_embeddings::SimilarityIndex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::models::ChunkId;

const MAGIC: &[u8; 4] = b"DXV1";

/// Magic + dimension (u32) + count (u64).
const HEADER_SIZE: usize = 16;

/// Fixed logical keys of the two snapshot artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    /// Opaque vector payload.
    Payload,
    /// `{ids, dimension, checksum}` record.
    Metadata,
}

impl SnapshotKey {
    /// File name used by [`FsSnapshotStore`].
    pub fn file_name(self) -> &'static str {
        match self {
            SnapshotKey::Payload => "vectors.index",
            SnapshotKey::Metadata => "meta.json",
        }
    }
}

/// Byte store holding the snapshot artifacts.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read an artifact; `None` if it does not exist.
    async fn read(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>>;

    /// Replace an artifact.
    async fn write(&self, key: SnapshotKey, bytes: &[u8]) -> Result<()>;

    /// Remove an artifact; missing artifacts are not an error.
    async fn remove(&self, key: SnapshotKey) -> Result<()>;
}

/// Snapshot artifacts as files in one directory.
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Get the directory holding the artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn read(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: SnapshotKey, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path(key);
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, bytes).await?;
        fs::rename(&temp_path, &path).await?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: SnapshotKey) -> Result<()> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Snapshot artifacts held in memory.
#[derive(Default)]
pub struct MemorySnapshotStore {
    artifacts: Mutex<HashMap<SnapshotKey, Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self, key: SnapshotKey) -> Result<Option<Vec<u8>>> {
        Ok(self.artifacts.lock().await.get(&key).cloned())
    }

    async fn write(&self, key: SnapshotKey, bytes: &[u8]) -> Result<()> {
        self.artifacts.lock().await.insert(key, bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: SnapshotKey) -> Result<()> {
        self.artifacts.lock().await.remove(&key);
        Ok(())
    }
}

/// Metadata record persisted next to the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Chunk ids in insertion order, parallel to the payload rows.
    pub ids: Vec<ChunkId>,

    /// Vector dimension.
    pub dimension: usize,

    /// Hex SHA-256 of the payload.
    pub checksum: String,
}

/// Decoded snapshot contents.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotParts {
    pub dimension: usize,
    pub ids: Vec<ChunkId>,
    pub vectors: Vec<f32>,
}

fn checksum(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

fn corrupt(msg: impl Into<String>) -> RetrievalError {
    RetrievalError::IndexCorrupt(msg.into())
}

/// Encode an index into `(payload, metadata)` artifacts.
pub fn encode(index: &dyn SimilarityIndex) -> Result<(Vec<u8>, Vec<u8>)> {
    let dimension = u32::try_from(index.dimension())
        .map_err(|_| RetrievalError::Persistence("dimension exceeds u32".to_string()))?;
    let vectors = index.vectors();

    let mut payload = Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(vectors));
    payload.extend_from_slice(MAGIC);
    payload.extend_from_slice(&dimension.to_le_bytes());
    payload.extend_from_slice(&(index.len() as u64).to_le_bytes());
    payload.extend_from_slice(bytemuck::cast_slice(vectors));

    let meta = SnapshotMeta {
        ids: index.ids().to_vec(),
        dimension: index.dimension(),
        checksum: checksum(&payload),
    };

    Ok((payload, serde_json::to_vec(&meta)?))
}

/// Decode and cross-check both artifacts.
pub fn decode(payload: &[u8], meta: &[u8]) -> Result<SnapshotParts> {
    let meta: SnapshotMeta =
        serde_json::from_slice(meta).map_err(|e| corrupt(format!("metadata unreadable: {e}")))?;

    if payload.len() < HEADER_SIZE || &payload[..4] != MAGIC {
        return Err(corrupt("payload header missing"));
    }
    if checksum(payload) != meta.checksum {
        return Err(corrupt("payload checksum does not match metadata"));
    }

    let mut dim_bytes = [0u8; 4];
    dim_bytes.copy_from_slice(&payload[4..8]);
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&payload[8..16]);
    let dimension = u32::from_le_bytes(dim_bytes) as usize;
    let count = u64::from_le_bytes(count_bytes) as usize;

    if dimension != meta.dimension {
        return Err(corrupt(format!(
            "payload dimension {dimension} disagrees with metadata {}",
            meta.dimension
        )));
    }
    if count != meta.ids.len() {
        return Err(corrupt(format!(
            "payload holds {count} vectors for {} ids",
            meta.ids.len()
        )));
    }
    let expected_len = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| corrupt("payload size overflows"))?;
    if payload.len() - HEADER_SIZE != expected_len {
        return Err(corrupt("payload length disagrees with header"));
    }

    let vectors: Vec<f32> = bytemuck::pod_collect_to_vec(&payload[HEADER_SIZE..]);

    Ok(SnapshotParts {
        dimension,
        ids: meta.ids,
        vectors,
    })
}

/// Persist both artifacts, payload first.
pub async fn write_snapshot(store: &dyn SnapshotStore, index: &dyn SimilarityIndex) -> Result<()> {
    let (payload, meta) = encode(index)?;
    store.write(SnapshotKey::Payload, &payload).await?;
    store.write(SnapshotKey::Metadata, &meta).await?;
    Ok(())
}

/// Read both artifacts.
///
/// Returns `Ok(None)` when neither exists and `IndexCorrupt` when only one does
/// or they disagree.
pub async fn read_snapshot(store: &dyn SnapshotStore) -> Result<Option<SnapshotParts>> {
    let payload = store.read(SnapshotKey::Payload).await?;
    let meta = store.read(SnapshotKey::Metadata).await?;

    match (payload, meta) {
        (None, None) => Ok(None),
        (Some(payload), Some(meta)) => decode(&payload, &meta).map(Some),
        (Some(_), None) => Err(corrupt("metadata missing")),
        (None, Some(_)) => Err(corrupt("payload missing")),
    }
}

/// Remove both artifacts.
pub async fn clear_snapshot(store: &dyn SnapshotStore) -> Result<()> {
    store.remove(SnapshotKey::Metadata).await?;
    store.remove(SnapshotKey::Payload).await
}
