//! Similarity computation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};
use crate::index::VectorId;

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// A zero vector has similarity 0.0 with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (magnitude_a * magnitude_b))
}

/// Compute the dot product between two embeddings.
///
/// For unit-length inputs this is their cosine similarity.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(dot_unchecked(a, b))
}

/// Dot product of two slices the caller has already length-checked.
pub(crate) fn dot_unchecked(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize an embedding to unit length in place.
///
/// Zero vectors are left untouched.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude = magnitude(embedding);
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Return a unit-length copy of `embedding`.
pub fn normalized(embedding: &[f32]) -> Vec<f32> {
    let mut out = embedding.to_vec();
    normalize(&mut out);
    out
}

/// A scored search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    /// Id of the matched vector.
    pub id: VectorId,

    /// Cosine similarity to the query.
    pub score: f32,
}

impl ScoredId {
    /// Create a new scored id.
    pub fn new(id: VectorId, score: f32) -> Self {
        Self { id, score }
    }
}

/// Keep the `k` highest scores, best first.
///
/// The sort is stable, so equal scores keep the order in which `scores`
/// yielded them. NaN scores rank below every real score.
pub fn top_k(scores: impl IntoIterator<Item = (VectorId, f32)>, k: usize) -> Vec<ScoredId> {
    if k == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(VectorId, OrderedFloat<f32>)> = scores
        .into_iter()
        .map(|(id, score)| {
            let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
            (id, OrderedFloat(score))
        })
        .collect();

    ranked.sort_by_key(|&(_, score)| Reverse(score));
    ranked.truncate(k);

    ranked
        .into_iter()
        .map(|(id, score)| ScoredId::new(id, score.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_is_untouched() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_top_k_orders_by_score() {
        let ranked = top_k(vec![(1, 0.9), (2, 0.1), (3, 0.5)], 2);
        let ids: Vec<VectorId> = ranked.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_top_k_ties_keep_input_order() {
        let ranked = top_k(vec![(7, 0.5), (3, 0.5), (9, 0.5), (1, 0.2)], 3);
        let ids: Vec<VectorId> = ranked.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 3, 9]);
    }

    #[test]
    fn test_top_k_nan_ranks_last() {
        let ranked = top_k(vec![(1, f32::NAN), (2, -0.5)], 2);
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[1].id, 1);
    }

    #[test]
    fn test_top_k_zero() {
        assert!(top_k(vec![(1, 1.0)], 0).is_empty());
    }
}
