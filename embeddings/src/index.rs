//! Flat similarity indexes for fast embedding lookups.
//!
//! Vectors are normalized once on insertion and stored row-major in a single
//! buffer, parallel to an id list in insertion order. A query is normalized
//! and scored against every row by inner product, which for unit vectors is
//! cosine similarity.
//!
//! Two backends share this layout: [`FlatIndex`] scans rows sequentially and
//! [`ParallelIndex`] scores them on the rayon pool. Both return identical
//! rankings, ties included.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{ScoredId, dot_unchecked, normalize, normalized, top_k};

/// Identifier stored alongside each indexed vector.
pub type VectorId = u64;

/// Which scan backend an index uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Sequential exact scan.
    #[default]
    Exact,
    /// Exact scan spread over the rayon thread pool.
    Parallel,
}

/// A top-k cosine similarity index over normalized vectors.
///
/// Implementations keep `ids().len() * dimension() == vectors().len()` at all
/// times; a failed `add` leaves the index unchanged.
pub trait SimilarityIndex: Send + Sync {
    /// Backend in use.
    fn kind(&self) -> IndexKind;

    /// Vector dimension accepted by this index.
    fn dimension(&self) -> usize;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed ids in insertion order.
    fn ids(&self) -> &[VectorId];

    /// Whether `id` is already indexed.
    fn contains(&self, id: VectorId) -> bool;

    /// Normalized vectors, row-major, parallel to [`SimilarityIndex::ids`].
    fn vectors(&self) -> &[f32];

    /// Normalize and append vectors.
    ///
    /// Ids already present (or repeated within the call) are skipped and the
    /// first vector is kept. Returns how many vectors were appended.
    fn add(&mut self, ids: &[VectorId], vectors: &[Embedding]) -> Result<usize>;

    /// Return the `k` most similar ids, best first, ties in insertion order.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>>;
}

/// Create an empty index of the given kind.
pub fn new_index(kind: IndexKind, dimension: usize) -> Result<Box<dyn SimilarityIndex>> {
    let store = FlatVectors::new(dimension)?;
    Ok(boxed(kind, store))
}

/// Rebuild an index from previously persisted parts.
///
/// `data` is taken verbatim: it must already be normalized.
pub fn index_from_parts(
    kind: IndexKind,
    dimension: usize,
    ids: Vec<VectorId>,
    data: Vec<f32>,
) -> Result<Box<dyn SimilarityIndex>> {
    let store = FlatVectors::from_parts(dimension, ids, data)?;
    Ok(boxed(kind, store))
}

fn boxed(kind: IndexKind, store: FlatVectors) -> Box<dyn SimilarityIndex> {
    match kind {
        IndexKind::Exact => Box::new(FlatIndex { store }),
        IndexKind::Parallel => Box::new(ParallelIndex { store }),
    }
}

/// Row-major vector storage shared by both backends.
#[derive(Debug, Clone)]
struct FlatVectors {
    dimension: usize,
    ids: Vec<VectorId>,
    data: Vec<f32>,
    members: HashSet<VectorId>,
}

impl FlatVectors {
    fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidDimension(dimension));
        }

        Ok(Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
            members: HashSet::new(),
        })
    }

    fn from_parts(dimension: usize, ids: Vec<VectorId>, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidDimension(dimension));
        }
        if data.len() != ids.len() * dimension {
            return Err(EmbeddingError::LengthMismatch {
                ids: ids.len(),
                vectors: data.len() / dimension,
            });
        }

        let members = ids.iter().copied().collect();
        Ok(Self {
            dimension,
            ids,
            data,
            members,
        })
    }

    fn append(&mut self, ids: &[VectorId], vectors: &[Embedding]) -> Result<usize> {
        if ids.len() != vectors.len() {
            return Err(EmbeddingError::LengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }
        // Validate everything before touching the buffers.
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let mut added = 0;
        for (id, vector) in ids.iter().zip(vectors) {
            if !self.members.insert(*id) {
                debug!("Skipping duplicate vector id {id}");
                continue;
            }
            let start = self.data.len();
            self.data.extend_from_slice(vector);
            normalize(&mut self.data[start..]);
            self.ids.push(*id);
            added += 1;
        }

        Ok(added)
    }

    fn prepare_query(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        Ok(normalized(query))
    }
}

/// Exact index that scans every row on the calling thread.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    store: FlatVectors,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dimension: usize) -> Result<Self> {
        Ok(Self {
            store: FlatVectors::new(dimension)?,
        })
    }
}

impl SimilarityIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn dimension(&self) -> usize {
        self.store.dimension
    }

    fn len(&self) -> usize {
        self.store.ids.len()
    }

    fn ids(&self) -> &[VectorId] {
        &self.store.ids
    }

    fn contains(&self, id: VectorId) -> bool {
        self.store.members.contains(&id)
    }

    fn vectors(&self) -> &[f32] {
        &self.store.data
    }

    fn add(&mut self, ids: &[VectorId], vectors: &[Embedding]) -> Result<usize> {
        self.store.append(ids, vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        let query = self.store.prepare_query(query)?;
        let scores = self
            .store
            .data
            .chunks_exact(self.store.dimension)
            .map(|row| dot_unchecked(row, &query));

        Ok(top_k(self.store.ids.iter().copied().zip(scores), k))
    }
}

/// Exact index that scores rows in parallel.
#[derive(Debug, Clone)]
pub struct ParallelIndex {
    store: FlatVectors,
}

impl ParallelIndex {
    /// Create an empty index.
    pub fn new(dimension: usize) -> Result<Self> {
        Ok(Self {
            store: FlatVectors::new(dimension)?,
        })
    }
}

impl SimilarityIndex for ParallelIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Parallel
    }

    fn dimension(&self) -> usize {
        self.store.dimension
    }

    fn len(&self) -> usize {
        self.store.ids.len()
    }

    fn ids(&self) -> &[VectorId] {
        &self.store.ids
    }

    fn contains(&self, id: VectorId) -> bool {
        self.store.members.contains(&id)
    }

    fn vectors(&self) -> &[f32] {
        &self.store.data
    }

    fn add(&mut self, ids: &[VectorId], vectors: &[Embedding]) -> Result<usize> {
        self.store.append(ids, vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        let query = self.store.prepare_query(query)?;
        // Indexed collect keeps row order, so ties still break by insertion.
        let scores: Vec<f32> = self
            .store
            .data
            .par_chunks_exact(self.store.dimension)
            .map(|row| dot_unchecked(row, &query))
            .collect();

        Ok(top_k(self.store.ids.iter().copied().zip(scores), k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(kind: IndexKind) -> Box<dyn SimilarityIndex> {
        let mut index = new_index(kind, 3).unwrap();
        index
            .add(
                &[10, 20, 30, 40],
                &[
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0],
                    vec![0.7, 0.7, 0.0],
                    vec![2.0, 0.0, 0.0],
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_index_search() {
        let index = sample(IndexKind::Exact);
        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<VectorId> = results.iter().map(|r| r.id).collect();

        // 10 and 40 normalize to the same vector; insertion order breaks the tie.
        assert_eq!(ids, vec![10, 40, 30]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_backends_agree() {
        let exact = sample(IndexKind::Exact);
        let parallel = sample(IndexKind::Parallel);

        for query in [[0.3, 0.9, 0.1], [1.0, 1.0, 1.0], [-1.0, 0.2, 0.0]] {
            assert_eq!(
                exact.search(&query, 4).unwrap(),
                parallel.search(&query, 4).unwrap()
            );
        }
    }

    #[test]
    fn test_vectors_are_normalized_on_add() {
        let index = sample(IndexKind::Exact);
        let last = &index.vectors()[9..12];
        assert_eq!(last, &[1.0, 0.0, 0.0]);
        assert_eq!(index.ids(), &[10, 20, 30, 40]);
    }

    #[test]
    fn test_dimension_mismatch_on_add_leaves_index_unchanged() {
        let mut index = sample(IndexKind::Parallel);
        let result = index.add(&[50, 60], &[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]]);

        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(index.len(), 4);
        assert!(!index.contains(50));
    }

    #[test]
    fn test_dimension_mismatch_on_search() {
        let index = sample(IndexKind::Exact);
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_skipped() {
        let mut index = sample(IndexKind::Exact);
        let added = index
            .add(&[20, 70, 70], &[vec![1.0, 1.0, 1.0], vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0]])
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(index.ids(), &[10, 20, 30, 40, 70]);
        let top = index.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(top[0].id, 70);
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let index = sample(IndexKind::Exact);
        let restored = index_from_parts(
            IndexKind::Parallel,
            index.dimension(),
            index.ids().to_vec(),
            index.vectors().to_vec(),
        )
        .unwrap();

        assert_eq!(restored.kind(), IndexKind::Parallel);
        assert!(restored.contains(30));
        assert_eq!(
            restored.search(&[0.0, 1.0, 0.0], 2).unwrap(),
            index.search(&[0.0, 1.0, 0.0], 2).unwrap()
        );
    }

    #[test]
    fn test_from_parts_rejects_ragged_data() {
        let result = index_from_parts(IndexKind::Exact, 3, vec![1, 2], vec![0.0; 5]);
        assert!(matches!(result, Err(EmbeddingError::LengthMismatch { .. })));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            FlatIndex::new(0),
            Err(EmbeddingError::InvalidDimension(0))
        ));
    }
}
