//! Core data types shared by the ingestion and answering pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A span of a document's text produced by the splitter.
///
/// Chunks have no identity outside their parent index; `index` is the
/// position within the document, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// The persisted vector index of exactly one document.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub document: String,
    /// Embedding model that produced every vector in `entries`.
    pub model: String,
    pub dims: usize,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<IndexedChunk>,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: String,
    pub chunks: usize,
    pub dims: usize,
}

/// An uploaded document as recorded in the metadata store.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A question asked about a document, with the answer that was returned.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRecord {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// Longest accepted document name. The index file appends `.index.json` and
/// must still fit the 255-byte file name limit.
pub const MAX_DOCUMENT_NAME_LEN: usize = 255 - ".index.json".len();

/// Check that a document name can address an index on local storage.
///
/// Returns the reason on rejection. Names are used verbatim as file stems,
/// so anything that could escape the index directory is refused.
pub fn validate_document_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("must not be empty");
    }
    if name.len() > MAX_DOCUMENT_NAME_LEN {
        return Err("must be at most 244 bytes");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("must not contain path separators");
    }
    if name.contains('\0') || name.chars().any(|c| c.is_control()) {
        return Err("must not contain control characters");
    }
    if name.starts_with('.') {
        return Err("must not start with '.'");
    }
    Ok(())
}
