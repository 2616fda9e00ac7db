//! Error taxonomy of the ingestion and answering pipeline.
//!
//! Ingestion errors are fatal to one ingestion attempt and never leave a
//! partial index behind. Query errors are fatal to the session that raised
//! them. Neither kind is retried.

use crate::extract::ExtractError;
use crate::index::IndexError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid document name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no index found for document '{0}'")]
    IndexNotFound(String),

    #[error("index for '{document}' is unusable: {reason}")]
    Retrieval { document: String, reason: String },

    #[error("question embedding failed: {0}")]
    Embedding(String),

    #[error("answer generation failed: {0}")]
    Generation(String),
}

impl QueryError {
    /// Short machine-readable tag, sent as the close reason of a session.
    pub fn tag(&self) -> &'static str {
        match self {
            QueryError::IndexNotFound(_) => "index_not_found",
            QueryError::Retrieval { .. } => "retrieval_failed",
            QueryError::Embedding(_) => "embedding_failed",
            QueryError::Generation(_) => "generation_failed",
        }
    }
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotFound(document) => QueryError::IndexNotFound(document),
            IndexError::Corrupt { document, reason } => QueryError::Retrieval { document, reason },
            // An unaddressable name can never have been ingested.
            IndexError::InvalidName { name, .. } => QueryError::IndexNotFound(name),
            IndexError::Io { document, source } => QueryError::Retrieval {
                document,
                reason: source.to_string(),
            },
        }
    }
}
