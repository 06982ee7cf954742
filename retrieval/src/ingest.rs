//! Ingestion pipeline: text → chunks → embeddings → storage → index.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use docindex_embeddings::{Embedding, EmbeddingError, EmbeddingProvider, EmbeddingRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunker::{ChunkerConfig, TextChunker};
use crate::error::{Result, RetrievalError};
use crate::manager::IndexManager;
use crate::models::{ChunkId, Document, Modality, NewChunk};
use crate::storage::ChunkStorage;

/// Extensions chunked as text regardless of MIME type.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "html", "htm", "rst"];

/// Default number of texts per provider call.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Outcome of pushing new vectors into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexUpdate {
    /// Vectors are searchable through the global index.
    Updated { appended: usize },
    /// Chunks are stored but the index could not take them. They are still
    /// reachable after a rebuild, or through text search.
    Degraded { reason: String },
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,

    /// Ids of the persisted chunks, in document order.
    pub chunk_ids: Vec<ChunkId>,

    pub index: IndexUpdate,
}

impl IngestReport {
    /// Whether the index update failed.
    pub fn is_degraded(&self) -> bool {
        matches!(self.index, IndexUpdate::Degraded { .. })
    }
}

/// Whether a document's text should be chunked rather than described.
pub fn is_text_like(mime_type: &str, name: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    if mime.starts_with("text/")
        || mime.contains("pdf")
        || mime.contains("json")
        || mime.contains("xml")
    {
        return true;
    }

    Path::new(name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            ext == "pdf" || TEXT_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Turns documents into embedded, indexed chunks.
pub struct IngestionPipeline {
    chunker: TextChunker,
    provider: Arc<dyn EmbeddingProvider>,
    model: Option<String>,
    batch_size: usize,

    /// Embedding length, fixed by the first successful embedding.
    dimension: OnceLock<usize>,
}

impl IngestionPipeline {
    /// Create a pipeline with default chunking and batching.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            chunker: TextChunker::new(),
            provider,
            model: None,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            dimension: OnceLock::new(),
        }
    }

    /// Set the chunking configuration.
    pub fn with_chunker(mut self, config: ChunkerConfig) -> Self {
        self.chunker = TextChunker::with_config(config);
        self
    }

    /// Set the model requested from the provider.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set how many texts go into one provider call. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embedding dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Name of the embedding provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Split a document into chunk texts with their modality.
    ///
    /// Always yields at least one segment.
    pub fn segments(&self, document: &Document, text: &str) -> Vec<(String, Modality)> {
        if !is_text_like(&document.mime_type, &document.name) {
            let description = format!(
                "Uploaded file '{}' (type {})",
                document.name, document.mime_type
            );
            return vec![(description, Modality::from_mime(&document.mime_type))];
        }

        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return vec![(
                format!("No extractable text for {}", document.name),
                Modality::Text,
            )];
        }

        chunks
            .into_iter()
            .map(|chunk| (chunk.to_string(), Modality::Text))
            .collect()
    }

    fn request(&self, text: &str) -> EmbeddingRequest {
        let request = EmbeddingRequest::new(text);
        match &self.model {
            Some(model) => request.with_model(model),
            None => request,
        }
    }

    /// Embed a query. The result is not checked against the pinned dimension;
    /// the index reports a mismatch itself.
    pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let response = self.provider.embed(self.request(text)).await?;
        Ok(response.embedding)
    }

    /// Embed texts in provider batches, all or nothing.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let requests = batch.iter().map(|text| self.request(text)).collect();
            let responses = self.provider.embed_batch(requests).await?;
            if responses.len() != batch.len() {
                return Err(RetrievalError::EmbeddingUnavailable(
                    EmbeddingError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        responses.len()
                    )),
                ));
            }
            embeddings.extend(responses.into_iter().map(|r| r.embedding));
        }

        self.check_dimension(&embeddings)?;
        Ok(embeddings)
    }

    fn check_dimension(&self, embeddings: &[Embedding]) -> Result<()> {
        let Some(first) = embeddings.first() else {
            return Ok(());
        };
        if first.is_empty() {
            return Err(RetrievalError::EmbeddingUnavailable(
                EmbeddingError::InvalidResponse(
                    "provider returned an empty embedding".to_string(),
                ),
            ));
        }

        let expected = *self.dimension.get_or_init(|| {
            info!("Embedding dimension fixed at {}", first.len());
            first.len()
        });
        match embeddings.iter().find(|e| e.len() != expected) {
            Some(bad) => Err(RetrievalError::DimensionMismatch {
                expected,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }

    /// Chunk, embed and persist a document, then extend the index.
    ///
    /// Embedding and storage failures abort before the index is touched and
    /// leave no chunks behind from this call. A failed index update is
    /// reported in the returned [`IngestReport`] instead. Document status is
    /// left to the caller.
    pub async fn ingest(
        &self,
        document: &Document,
        text: &str,
        storage: &dyn ChunkStorage,
        manager: &IndexManager,
    ) -> Result<IngestReport> {
        let segments = self.segments(document, text);
        let texts: Vec<String> = segments.iter().map(|(text, _)| text.clone()).collect();
        debug!("Document {} split into {} chunks", document.id, texts.len());

        let embeddings = self.embed_texts(&texts).await?;

        let chunks: Vec<NewChunk> = segments
            .into_iter()
            .zip(embeddings.iter().cloned())
            .enumerate()
            .map(|(i, ((content, modality), embedding))| NewChunk {
                document_id: document.id.clone(),
                batch_id: document.batch_id.clone(),
                content,
                modality,
                citation_locator: None,
                chunk_index: u32::try_from(i).unwrap_or(u32::MAX),
                embedding: Some(embedding),
            })
            .collect();
        let chunk_ids = storage.insert_chunks(chunks).await?;

        let pairs = chunk_ids.iter().copied().zip(embeddings).collect();
        let index = match manager.add(pairs, storage).await {
            Ok(appended) => IndexUpdate::Updated { appended },
            Err(e) => {
                warn!("Index update failed for document {}: {e}", document.id);
                IndexUpdate::Degraded {
                    reason: e.to_string(),
                }
            }
        };

        info!(
            "Ingested document {} ({} chunks)",
            document.id,
            chunk_ids.len()
        );

        Ok(IngestReport {
            document_id: document.id.clone(),
            chunk_ids,
            index,
        })
    }
}
