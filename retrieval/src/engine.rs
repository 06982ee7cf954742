//! Retrieval service: the entry point collaborators call.

use std::path::PathBuf;
use std::sync::Arc;

use docindex_embeddings::{EmbeddingProvider, IndexKind, LocalProvider, OpenAIProvider};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig};
use crate::error::{Result, RetrievalError};
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::manager::{IndexManager, IndexStatus};
use crate::models::{Chunk, Document, DocumentStatus};
use crate::search::{self, Scope, SearchOutcome, SearchRequest, SearchStrategy};
use crate::snapshot::{FsSnapshotStore, SnapshotStore};
use crate::storage::{ChunkStorage, MemoryStorage};

/// Retrieval service combining storage, the embedding provider and the index.
///
/// Coordinates:
/// - chunking, embedding and persisting documents
/// - the global vector index and its on-disk snapshot
/// - scoped, global and fallback search
pub struct RetrievalService {
    /// Configuration.
    config: RetrievalConfig,

    /// Database of record for documents and chunks.
    storage: Arc<dyn ChunkStorage>,

    /// Global similarity index.
    manager: IndexManager,

    /// Ingestion pipeline, also used to embed queries.
    pipeline: IngestionPipeline,
}

impl RetrievalService {
    /// Create a new service builder.
    pub fn builder() -> RetrievalServiceBuilder {
        RetrievalServiceBuilder::new()
    }

    /// Open the service with local JSON storage and an on-disk snapshot.
    pub async fn new(config: RetrievalConfig) -> Result<Self> {
        RetrievalServiceBuilder::new().with_config(config).build().await
    }

    /// Assemble a service from its collaborators.
    pub fn from_parts(
        config: RetrievalConfig,
        storage: Arc<dyn ChunkStorage>,
        snapshots: Arc<dyn SnapshotStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let mut pipeline = IngestionPipeline::new(provider)
            .with_chunker(config.chunking)
            .with_batch_size(config.embedding.batch_size);
        if let Some(model) = &config.embedding.model {
            pipeline = pipeline.with_model(model.as_str());
        }
        let manager = IndexManager::new(config.index_backend, snapshots);

        info!(
            "Retrieval service ready ({} embeddings, {:?} index)",
            pipeline.provider_name(),
            config.index_backend
        );

        Ok(Self {
            config,
            storage,
            manager,
            pipeline,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Get the storage collaborator.
    pub fn storage(&self) -> &Arc<dyn ChunkStorage> {
        &self.storage
    }

    /// Get the index manager.
    pub fn index(&self) -> &IndexManager {
        &self.manager
    }

    /// Chunk, embed and persist a document already present in storage.
    ///
    /// The document's status is not changed; see [`Self::ingest_document`].
    pub async fn ingest(&self, document: &Document, extracted_text: &str) -> Result<IngestReport> {
        self.pipeline
            .ingest(document, extracted_text, self.storage.as_ref(), &self.manager)
            .await
    }

    /// Record a document, ingest it, and mark it `ready` or `failed`.
    pub async fn ingest_document(
        &self,
        mut document: Document,
        extracted_text: &str,
    ) -> Result<IngestReport> {
        document.status = DocumentStatus::Processing;
        self.storage.put_document(document.clone()).await?;

        match self.ingest(&document, extracted_text).await {
            Ok(report) => {
                self.storage
                    .set_document_status(&document.id, DocumentStatus::Ready)
                    .await?;
                Ok(report)
            }
            Err(e) => {
                warn!("Ingestion of document {} failed: {e}", document.id);
                if let Err(status_err) = self
                    .storage
                    .set_document_status(&document.id, DocumentStatus::Failed)
                    .await
                {
                    warn!("Could not mark document {} failed: {status_err}", document.id);
                }
                Err(e)
            }
        }
    }

    /// Rank chunk ids for a query.
    ///
    /// A filter that resolves to no documents returns an empty outcome
    /// without embedding the query. On the unfiltered path an unavailable
    /// embedding provider degrades to text search; on filtered paths it is
    /// an error.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let k = match request.k {
            Some(0) => {
                return Err(RetrievalError::InvalidInput(
                    "k must be positive".to_string(),
                ));
            }
            requested => self.config.search.effective_k(requested),
        };
        if request.query_text.trim().is_empty() {
            return Err(RetrievalError::InvalidInput("query text is empty".to_string()));
        }

        let storage = self.storage.as_ref();
        let scope = search::resolve_scope(
            request.document_ids.as_deref(),
            request.batch_id.as_deref(),
            storage,
        )
        .await?;
        debug!("Search scope: {scope:?}, k = {k}");

        let query_vector = match scope {
            Scope::Nothing => Vec::new(),
            Scope::Documents(_) => self.pipeline.embed_query(&request.query_text).await?,
            Scope::Global => match self.pipeline.embed_query(&request.query_text).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Query embedding failed, using text search: {e}");
                    return search::fallback_outcome(&request.query_text, k, storage).await;
                }
            },
        };

        search::search_in_scope(
            scope,
            &request.query_text,
            &query_vector,
            k,
            &self.manager,
            storage,
        )
        .await
    }

    /// Run a query and resolve the ranked ids to chunk records.
    ///
    /// Records come back in ranked order with their owning document.
    /// Ids whose chunks have since been deleted are dropped.
    pub async fn search_chunks(&self, request: &SearchRequest) -> Result<SearchResults> {
        let outcome = self.search(request).await?;
        let chunks = self.storage.chunks_by_ids(&outcome.chunk_ids()).await?;

        let mut results = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            let score = outcome
                .hits
                .iter()
                .find(|hit| hit.chunk_id == chunk.id)
                .and_then(|hit| hit.score);
            let document = self.storage.document(&chunk.document_id).await?;
            chunk.embedding = None;
            results.push(RetrievedChunk {
                chunk,
                document,
                score,
            });
        }

        Ok(SearchResults {
            strategy: outcome.strategy,
            results,
        })
    }

    /// Rebuild the global index from storage.
    pub async fn rebuild_index(&self) -> Result<IndexStatus> {
        self.manager.rebuild(self.storage.as_ref()).await
    }

    /// Delete a document and its chunks.
    ///
    /// With `rebuild_on_delete` the index is rebuilt so it stops returning the
    /// removed chunks. A failed rebuild is logged; the deletion stands.
    pub async fn delete_document(&self, document_id: &str) -> Result<DeleteReport> {
        let chunks_removed = self.storage.delete_document(document_id).await?;

        let index = if self.config.rebuild_on_delete {
            match self.rebuild_index().await {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("Index rebuild after deleting {document_id} failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(DeleteReport {
            document_id: document_id.to_string(),
            chunks_removed,
            index,
        })
    }

    /// All documents, newest first.
    pub async fn documents(&self) -> Result<Vec<Document>> {
        self.storage
            .documents()
            .await
            .map_err(RetrievalError::from)
    }

    /// Load the snapshot or build the index from storage, then report its
    /// status. Does nothing beyond reporting once the index is initialized.
    pub async fn load_index(&self) -> Result<IndexStatus> {
        self.manager.load_or_build(self.storage.as_ref()).await
    }

    /// Get index statistics without loading anything.
    pub async fn index_status(&self) -> IndexStatus {
        self.manager.status().await
    }

    /// Retry any snapshot write that failed earlier.
    pub async fn flush(&self) -> Result<()> {
        self.manager.flush().await
    }
}

/// Create the embedding provider named by the configuration.
///
/// An OpenAI provider without an API key falls back to the local provider.
pub fn provider_from_config(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    let local = || -> Arc<dyn EmbeddingProvider> {
        Arc::new(LocalProvider::new().with_dimension(config.dimension))
    };

    match config.provider {
        EmbeddingProviderType::Local => local(),
        EmbeddingProviderType::OpenAI => {
            let mut provider = OpenAIProvider::new();
            if let Some(model) = &config.model {
                provider = provider.with_model(model);
            }
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url);
            }

            if provider.is_available() {
                Arc::new(provider)
            } else {
                warn!("OPENAI_API_KEY is not set, using local embeddings");
                local()
            }
        }
    }
}

/// Builder for [`RetrievalService`].
pub struct RetrievalServiceBuilder {
    config: RetrievalConfig,
    storage: Option<Arc<dyn ChunkStorage>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl RetrievalServiceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RetrievalConfig::default(),
            storage: None,
            snapshots: None,
            provider: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Set the index backend.
    pub fn with_index_backend(mut self, kind: IndexKind) -> Self {
        self.config.index_backend = kind;
        self
    }

    /// Use a specific storage collaborator.
    pub fn with_storage(mut self, storage: Arc<dyn ChunkStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a specific snapshot store.
    pub fn with_snapshot_store(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Use a specific embedding provider.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the service, opening default collaborators for any not given.
    pub async fn build(self) -> Result<RetrievalService> {
        let config = self.config;

        let storage: Arc<dyn ChunkStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::open(config.store_path()).await?),
        };
        let snapshots: Arc<dyn SnapshotStore> = match self.snapshots {
            Some(snapshots) => snapshots,
            None => Arc::new(FsSnapshotStore::new(config.index_dir())),
        };
        let provider = self
            .provider
            .unwrap_or_else(|| provider_from_config(&config.embedding));

        RetrievalService::from_parts(config, storage, snapshots, provider)
    }
}

impl Default for RetrievalServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A chunk returned by [`RetrievalService::search_chunks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The chunk, without its embedding.
    pub chunk: Chunk,

    /// Owning document, if it still exists.
    pub document: Option<Document>,

    /// Cosine similarity; absent for text-search matches.
    pub score: Option<f32>,
}

/// Resolved search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub strategy: SearchStrategy,
    pub results: Vec<RetrievedChunk>,
}

/// Result of deleting a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub document_id: String,
    pub chunks_removed: usize,

    /// Index state after the rebuild, if one ran and succeeded.
    pub index: Option<IndexStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::IndexState;
    use crate::snapshot::MemorySnapshotStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn service() -> RetrievalService {
        let config = RetrievalConfig::new("/nonexistent").with_chunking(
            crate::chunker::ChunkerConfig {
                chunk_size: 40,
                overlap: 5,
            },
        );
        RetrievalService::from_parts(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(LocalProvider::new().with_dimension(64)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_builder_opens_local_state() {
        let temp_dir = TempDir::new().unwrap();

        let service = RetrievalService::builder()
            .with_data_dir(temp_dir.path())
            .with_index_backend(IndexKind::Parallel)
            .build()
            .await
            .unwrap();

        assert_eq!(service.config().store_path(), temp_dir.path().join("store.json"));
        assert_eq!(service.index_status().await.backend, IndexKind::Parallel);
    }

    #[tokio::test]
    async fn test_ingest_document_marks_ready() {
        let service = service();
        let document = Document::new("guide.md", "text/markdown", 10).with_id("guide");

        let report = service
            .ingest_document(document, "Install the toolchain, then run the tests.")
            .await
            .unwrap();
        assert!(!report.chunk_ids.is_empty());

        let stored = service.storage().document("guide").await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn test_search_chunks_resolves_records() {
        let service = service();
        service
            .ingest_document(
                Document::new("pets.txt", "text/plain", 10).with_id("pets"),
                "cats purr and dogs bark",
            )
            .await
            .unwrap();
        service
            .ingest_document(
                Document::new("space.txt", "text/plain", 10).with_id("space"),
                "rockets orbit distant planets",
            )
            .await
            .unwrap();

        let results = service
            .search_chunks(&SearchRequest::new("rockets planets").with_k(1))
            .await
            .unwrap();

        assert_eq!(results.strategy, SearchStrategy::Global);
        assert_eq!(results.results.len(), 1);
        let top = &results.results[0];
        assert_eq!(top.chunk.document_id, "space");
        assert_eq!(top.chunk.embedding, None);
        assert_eq!(top.document.as_ref().map(|d| d.name.as_str()), Some("space.txt"));
        assert!(top.score.is_some());
    }

    #[tokio::test]
    async fn test_delete_rebuilds_index() {
        let service = service();
        service
            .ingest_document(
                Document::new("a.txt", "text/plain", 10).with_id("a"),
                "first document body",
            )
            .await
            .unwrap();

        let report = service.delete_document("a").await.unwrap();
        assert_eq!(report.chunks_removed, 1);
        assert_eq!(report.index.map(|s| s.state), Some(IndexState::Empty));

        let outcome = service
            .search(&SearchRequest::new("first document"))
            .await
            .unwrap();
        assert_eq!(outcome.strategy, SearchStrategy::Fallback);
        assert!(outcome.hits.is_empty());
    }

    #[tokio::test]
    async fn test_load_index_reports_loaded_state() {
        let temp_dir = TempDir::new().unwrap();
        {
            let service = RetrievalService::new(RetrievalConfig::new(temp_dir.path()))
                .await
                .unwrap();
            service
                .ingest_document(
                    Document::new("a.txt", "text/plain", 10).with_id("a"),
                    "persisted body text",
                )
                .await
                .unwrap();
        }

        let service = RetrievalService::new(RetrievalConfig::new(temp_dir.path()))
            .await
            .unwrap();
        assert_eq!(service.index_status().await.state, IndexState::Uninitialized);

        let status = service.load_index().await.unwrap();
        assert_eq!(status.state, IndexState::Loaded);
        assert_eq!(status.entries, 1);
    }

    #[tokio::test]
    async fn test_malformed_requests_are_rejected() {
        let service = service();
        assert!(matches!(
            service.search(&SearchRequest::new("x").with_k(0)).await,
            Err(RetrievalError::InvalidInput(_))
        ));
        assert!(matches!(
            service.search(&SearchRequest::new("   ")).await,
            Err(RetrievalError::InvalidInput(_))
        ));
    }

    /// Local provider that records the model named in each request.
    #[derive(Default)]
    struct RecordingProvider {
        models: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn default_model(&self) -> &str {
            "default"
        }

        fn default_dimension(&self) -> usize {
            8
        }

        async fn embed(
            &self,
            request: docindex_embeddings::EmbeddingRequest,
        ) -> docindex_embeddings::Result<docindex_embeddings::EmbeddingResponse> {
            self.models.lock().unwrap().push(request.model.clone());
            LocalProvider::new().with_dimension(8).embed(request).await
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_configured_model_reaches_provider() {
        let mut config = RetrievalConfig::new("/nonexistent");
        config.embedding.model = Some("text-embedding-3-large".to_string());
        let provider = Arc::new(RecordingProvider::default());
        let service = RetrievalService::from_parts(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemorySnapshotStore::new()),
            provider.clone(),
        )
        .unwrap();

        service
            .ingest_document(
                Document::new("a.txt", "text/plain", 5).with_id("a"),
                "hello",
            )
            .await
            .unwrap();
        service.search(&SearchRequest::new("hello")).await.unwrap();

        let models = provider.models.lock().unwrap().clone();
        assert!(!models.is_empty());
        assert!(
            models
                .iter()
                .all(|m| m.as_deref() == Some("text-embedding-3-large"))
        );
    }

    #[test]
    fn test_provider_from_config() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Local,
            dimension: 16,
            ..EmbeddingConfig::default()
        };
        let provider = provider_from_config(&config);
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.default_dimension(), 16);
    }
}
