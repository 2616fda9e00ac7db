//! Per-document vector index storage.
//!
//! Each document has exactly one [`VectorIndex`], addressed by the
//! document's name. The [`IndexStore`] trait abstracts where indexes live:
//! [`fs::FsIndexStore`] persists them as files, [`memory::MemoryIndexStore`]
//! keeps them in a map for tests. Both go through the same codec, so an
//! index is self-describing: it records the embedding model, the vector
//! dimensionality and a hash per chunk, and loading verifies all of them.
//!
//! Saving replaces an index wholesale. Readers observe either the previous
//! index, no index, or the complete new one.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::hash_text;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, IndexedChunk, VectorIndex};

/// Bumped whenever the persisted layout changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no index for document '{0}'")]
    NotFound(String),

    #[error("index for '{document}' is corrupt: {reason}")]
    Corrupt { document: String, reason: String },

    #[error("invalid document name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("index I/O failed for '{document}': {source}")]
    Io {
        document: String,
        #[source]
        source: std::io::Error,
    },
}

/// Storage backend for vector indexes.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save`](IndexStore::save) | Persist an index, replacing any previous one |
/// | [`load`](IndexStore::load) | Read and verify the index of a document |
/// | [`exists`](IndexStore::exists) | Check whether a document has been indexed |
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn save(&self, index: &VectorIndex) -> Result<(), IndexError>;
    async fn load(&self, document: &str) -> Result<VectorIndex, IndexError>;
    async fn exists(&self, document: &str) -> Result<bool, IndexError>;
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format: u32,
    document: String,
    model: String,
    dims: usize,
    created_at: DateTime<Utc>,
    chunks: Vec<PersistedChunk>,
}

#[derive(Serialize, Deserialize)]
struct PersistedChunk {
    index: usize,
    text: String,
    hash: String,
    /// Base64 of the little-endian `f32` components.
    vector: String,
}

/// Serialize an index to its persisted JSON form.
pub fn encode(index: &VectorIndex) -> Result<Vec<u8>, IndexError> {
    let persisted = PersistedIndex {
        format: FORMAT_VERSION,
        document: index.document.clone(),
        model: index.model.clone(),
        dims: index.dims,
        created_at: index.created_at,
        chunks: index
            .entries
            .iter()
            .map(|entry| PersistedChunk {
                index: entry.chunk.index,
                text: entry.chunk.text.clone(),
                hash: entry.chunk.hash.clone(),
                vector: base64::engine::general_purpose::STANDARD
                    .encode(vec_to_blob(&entry.vector)),
            })
            .collect(),
    };

    serde_json::to_vec(&persisted).map_err(|e| IndexError::Corrupt {
        document: index.document.clone(),
        reason: format!("failed to serialize: {}", e),
    })
}

/// Parse and verify a persisted index for `document`.
pub fn decode(document: &str, bytes: &[u8]) -> Result<VectorIndex, IndexError> {
    let corrupt = |reason: String| IndexError::Corrupt {
        document: document.to_string(),
        reason,
    };

    let persisted: PersistedIndex =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("invalid JSON: {}", e)))?;

    if persisted.format != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {}",
            persisted.format
        )));
    }
    if persisted.document != document {
        return Err(corrupt(format!(
            "index belongs to '{}'",
            persisted.document
        )));
    }

    let vector_bytes = persisted
        .dims
        .checked_mul(4)
        .ok_or_else(|| corrupt(format!("dims {} out of range", persisted.dims)))?;

    let mut entries = Vec::with_capacity(persisted.chunks.len());
    for (position, stored) in persisted.chunks.into_iter().enumerate() {
        if stored.index != position {
            return Err(corrupt(format!(
                "chunk {} stored at position {}",
                stored.index, position
            )));
        }
        if hash_text(&stored.text) != stored.hash {
            return Err(corrupt(format!("chunk {} hash mismatch", position)));
        }
        let blob = base64::engine::general_purpose::STANDARD
            .decode(stored.vector.as_bytes())
            .map_err(|e| corrupt(format!("chunk {} vector: {}", position, e)))?;
        if blob.len() != vector_bytes {
            return Err(corrupt(format!(
                "chunk {} has {} vector bytes, expected {}",
                position,
                blob.len(),
                vector_bytes
            )));
        }

        entries.push(IndexedChunk {
            chunk: Chunk {
                index: stored.index,
                text: stored.text,
                hash: stored.hash,
            },
            vector: blob_to_vec(&blob),
        });
    }

    Ok(VectorIndex {
        document: persisted.document,
        model: persisted.model,
        dims: persisted.dims,
        created_at: persisted.created_at,
        entries,
    })
}
