//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for one document: name validation → text
//! extraction → chunking → batched embedding → index persistence. The
//! pipeline is all-or-nothing: an index is written only once every chunk
//! has a vector, and the write replaces any previous index atomically.

use std::sync::Arc;

use chrono::Utc;

use crate::chunk::TextSplitter;
use crate::embedding::EmbeddingProvider;
use crate::error::IngestError;
use crate::extract;
use crate::index::IndexStore;
use crate::models::{validate_document_name, IndexedChunk, IngestReport, VectorIndex};

const DEFAULT_BATCH_SIZE: usize = 64;

pub struct Ingestor {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Build and persist the vector index of `name` from its raw bytes.
    ///
    /// The content type is inferred from the extension of `name`.
    pub async fn ingest(&self, name: &str, bytes: Vec<u8>) -> Result<IngestReport, IngestError> {
        validate_document_name(name).map_err(|reason| IngestError::InvalidName {
            name: name.to_string(),
            reason,
        })?;

        // PDF parsing is CPU-bound.
        let owned_name = name.to_string();
        let text = tokio::task::spawn_blocking(move || extract::extract_named(&owned_name, &bytes))
            .await
            .map_err(|e| extract::ExtractError::Aborted(e.to_string()))??;

        let chunks = self.splitter.chunk(&text);
        tracing::info!(document = name, chunks = chunks.len(), "extracted text");

        let dims = self.embedder.dims();
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| IngestError::Embedding(format!("{:#}", e)))?;

            if vectors.len() != batch.len() {
                return Err(IngestError::Embedding(format!(
                    "requested {} vectors, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dims {
                    return Err(IngestError::Embedding(format!(
                        "chunk {} embedded with {} dims, expected {}",
                        chunk.index,
                        vector.len(),
                        dims
                    )));
                }
                entries.push(IndexedChunk {
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        let index = VectorIndex {
            document: name.to_string(),
            model: self.embedder.model_name().to_string(),
            dims,
            created_at: Utc::now(),
            entries,
        };
        self.store
            .save(&index)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;

        tracing::info!(
            document = name,
            chunks = index.entries.len(),
            model = %index.model,
            "index written"
        );

        Ok(IngestReport {
            document: index.document,
            chunks: index.entries.len(),
            dims,
        })
    }
}
