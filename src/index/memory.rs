//! In-memory [`IndexStore`] for tests.
//!
//! Indexes are kept in their encoded form so loads exercise the same
//! verification as the file store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{decode, encode, IndexError, IndexStore};
use crate::models::VectorIndex;

#[derive(Default)]
pub struct MemoryIndexStore {
    indexes: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under a document name, bypassing the encoder.
    pub fn insert_raw(&self, document: &str, bytes: Vec<u8>) {
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.to_string(), bytes);
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn save(&self, index: &VectorIndex) -> Result<(), IndexError> {
        let bytes = encode(index)?;
        self.insert_raw(&index.document, bytes);
        Ok(())
    }

    async fn load(&self, document: &str) -> Result<VectorIndex, IndexError> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let bytes = indexes
            .get(document)
            .ok_or_else(|| IndexError::NotFound(document.to_string()))?;
        decode(document, bytes)
    }

    async fn exists(&self, document: &str) -> Result<bool, IndexError> {
        Ok(self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(document))
    }
}
