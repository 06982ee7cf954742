//! Per-query choice between the global index, scoped search and fallback.
//!
//! 1. A batch id resolves to its documents. An unknown or empty batch is an
//!    empty result, not a failure, and nothing else runs.
//! 2. Explicit document ids go straight to scoped search.
//! 3. Otherwise the global index is loaded and searched. An empty ranking or
//!    a failure other than a dimension mismatch falls back to text search.
//!
//! Errors from the scoped path always propagate.

use docindex_embeddings::ScoredId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RetrievalError};
use crate::fallback::fallback_search;
use crate::manager::IndexManager;
use crate::models::ChunkId;
use crate::scoped::scoped_search;
use crate::storage::ChunkStorage;

/// A query as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,

    /// Requested result count; `None` uses the configured default.
    #[serde(default)]
    pub k: Option<usize>,

    #[serde(default)]
    pub document_ids: Option<Vec<String>>,

    #[serde(default)]
    pub batch_id: Option<String>,
}

impl SearchRequest {
    /// Create an unscoped request.
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            ..Self::default()
        }
    }

    /// Set the result count.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Restrict to the given documents.
    pub fn with_documents(mut self, document_ids: Vec<String>) -> Self {
        self.document_ids = Some(document_ids);
        self
    }

    /// Restrict to the documents of a batch.
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Ranked by the global index.
    Global,
    /// Ranked by brute force over a document subset.
    Scoped,
    /// Unranked substring matches.
    Fallback,
    /// The filter resolved to no documents.
    EmptyScope,
}

/// One result. Fallback hits carry no score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: Option<f32>,
}

impl From<ScoredId> for SearchHit {
    fn from(scored: ScoredId) -> Self {
        Self {
            chunk_id: scored.id,
            score: Some(scored.score),
        }
    }
}

/// Ranked hits plus the path that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub strategy: SearchStrategy,
}

impl SearchOutcome {
    fn empty_scope() -> Self {
        Self {
            hits: Vec::new(),
            strategy: SearchStrategy::EmptyScope,
        }
    }

    fn ranked(strategy: SearchStrategy, ranked: Vec<ScoredId>) -> Self {
        Self {
            hits: ranked.into_iter().map(SearchHit::from).collect(),
            strategy,
        }
    }

    /// Hit ids in result order.
    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.hits.iter().map(|hit| hit.chunk_id).collect()
    }
}

/// Resolved query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The filter names no documents.
    Nothing,
    /// Search only these documents.
    Documents(Vec<String>),
    /// No filter.
    Global,
}

/// Resolve the filters of a query. A batch id wins over document ids.
///
/// Runs before the query is embedded, so an empty scope costs no
/// embedding call.
pub async fn resolve_scope(
    document_ids: Option<&[String]>,
    batch_id: Option<&str>,
    storage: &dyn ChunkStorage,
) -> Result<Scope> {
    if let Some(batch_id) = batch_id {
        let ids = storage.document_ids_for_batch(batch_id).await?;
        if ids.is_empty() {
            debug!("Batch {batch_id} has no documents");
            return Ok(Scope::Nothing);
        }
        return Ok(Scope::Documents(ids));
    }

    match document_ids {
        Some([]) => Ok(Scope::Nothing),
        Some(ids) => Ok(Scope::Documents(ids.to_vec())),
        None => Ok(Scope::Global),
    }
}

/// Run a query within an already resolved scope.
pub async fn search_in_scope(
    scope: Scope,
    query_text: &str,
    query_vector: &[f32],
    k: usize,
    manager: &IndexManager,
    storage: &dyn ChunkStorage,
) -> Result<SearchOutcome> {
    match scope {
        Scope::Nothing => Ok(SearchOutcome::empty_scope()),
        Scope::Documents(document_ids) => {
            let ranked = scoped_search(query_vector, k, &document_ids, storage).await?;
            Ok(SearchOutcome::ranked(SearchStrategy::Scoped, ranked))
        }
        Scope::Global => match global_search(query_vector, k, manager, storage).await {
            Ok(ranked) if !ranked.is_empty() => {
                Ok(SearchOutcome::ranked(SearchStrategy::Global, ranked))
            }
            Ok(_) => {
                debug!("Vector index returned nothing, using text search");
                fallback_outcome(query_text, k, storage).await
            }
            Err(e) if e.is_caller_error() => Err(e),
            Err(e) => {
                warn!("Vector search failed, using text search: {e}");
                fallback_outcome(query_text, k, storage).await
            }
        },
    }
}

/// Resolve filters and run a query.
pub async fn search(
    query_text: &str,
    query_vector: &[f32],
    k: usize,
    document_ids: Option<&[String]>,
    batch_id: Option<&str>,
    manager: &IndexManager,
    storage: &dyn ChunkStorage,
) -> Result<SearchOutcome> {
    let scope = resolve_scope(document_ids, batch_id, storage).await?;
    search_in_scope(scope, query_text, query_vector, k, manager, storage).await
}

async fn global_search(
    query_vector: &[f32],
    k: usize,
    manager: &IndexManager,
    storage: &dyn ChunkStorage,
) -> Result<Vec<ScoredId>> {
    if query_vector.is_empty() {
        return Err(RetrievalError::InvalidInput(
            "query vector is empty".to_string(),
        ));
    }
    manager.load_or_build(storage).await?;
    manager.search(query_vector, k).await
}

/// Answer a query with unranked text matches.
pub async fn fallback_outcome(
    query_text: &str,
    k: usize,
    storage: &dyn ChunkStorage,
) -> Result<SearchOutcome> {
    let chunks = fallback_search(query_text, k, storage).await?;
    Ok(SearchOutcome {
        hits: chunks
            .into_iter()
            .map(|chunk| SearchHit {
                chunk_id: chunk.id,
                score: None,
            })
            .collect(),
        strategy: SearchStrategy::Fallback,
    })
}
