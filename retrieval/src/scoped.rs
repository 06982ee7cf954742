//! Ephemeral brute-force search over a subset of documents.
//!
//! The global index has no notion of documents or batches, so filtered
//! queries are answered straight from storage: fetch the candidate
//! embeddings, normalize them, score, rank. Cost is linear in the number of
//! candidates and nothing is cached between calls.

use docindex_embeddings::{ScoredId, dot_product, normalized, top_k};
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::storage::ChunkStorage;

/// Rank the chunks of `document_ids` by cosine similarity to `query`.
///
/// Ties keep the order storage returned the rows in. Chunks deleted from
/// storage are never candidates. An empty `document_ids` returns an empty
/// ranking without querying storage.
pub async fn scoped_search(
    query: &[f32],
    k: usize,
    document_ids: &[String],
    storage: &dyn ChunkStorage,
) -> Result<Vec<ScoredId>> {
    if document_ids.is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    if query.is_empty() {
        return Err(RetrievalError::InvalidInput(
            "query vector is empty".to_string(),
        ));
    }

    let candidates = storage.chunk_embeddings_for(document_ids).await?;
    debug!(
        "Scoped search over {} chunks from {} documents",
        candidates.len(),
        document_ids.len()
    );

    let query = normalized(query);
    let mut scores = Vec::with_capacity(candidates.len());
    for (id, embedding) in candidates {
        let score =
            dot_product(&normalized(&embedding), &query).map_err(RetrievalError::from_index)?;
        scores.push((id, score));
    }

    Ok(top_k(scores, k))
}
