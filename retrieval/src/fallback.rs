//! Last-resort text search used when vector search has nothing to offer.

use tracing::debug;

use crate::error::Result;
use crate::models::Chunk;
use crate::storage::ChunkStorage;

/// Case-insensitive substring match of `query_text` against chunk content.
///
/// Returns up to `k` chunks in storage order. There is no relevance ranking:
/// the first match is not the best match, only the first one storage found.
/// A blank query matches nothing.
pub async fn fallback_search(
    query_text: &str,
    k: usize,
    storage: &dyn ChunkStorage,
) -> Result<Vec<Chunk>> {
    let query_text = query_text.trim();
    if query_text.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let chunks = storage.text_search(query_text, k).await?;
    debug!("Fallback text search matched {} chunks", chunks.len());
    Ok(chunks)
}
