//! File-backed [`IndexStore`].
//!
//! Layout: `<dir>/<document>.index.json`. Writes go to a hidden temporary
//! file in the same directory and are renamed over the target, so a crash
//! mid-write never leaves a half-written index under the real name.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use uuid::Uuid;

use super::{decode, encode, IndexError, IndexStore};
use crate::models::{validate_document_name, VectorIndex};

const EXTENSION: &str = "index.json";

pub struct FsIndexStore {
    dir: PathBuf,
}

impl FsIndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, document: &str) -> Result<PathBuf, IndexError> {
        validate_document_name(document).map_err(|reason| IndexError::InvalidName {
            name: document.to_string(),
            reason,
        })?;
        Ok(self.dir.join(format!("{}.{}", document, EXTENSION)))
    }
}

fn io_error(document: &str, source: std::io::Error) -> IndexError {
    IndexError::Io {
        document: document.to_string(),
        source,
    }
}

#[async_trait]
impl IndexStore for FsIndexStore {
    async fn save(&self, index: &VectorIndex) -> Result<(), IndexError> {
        let target = self.path_for(&index.document)?;
        let bytes = encode(index)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&index.document, e))?;

        // Leading '.' keeps temp files out of the valid-name space.
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(&index.document, e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&index.document, e));
        }

        Ok(())
    }

    async fn load(&self, document: &str) -> Result<VectorIndex, IndexError> {
        let path = self.path_for(document)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(IndexError::NotFound(document.to_string()))
            }
            Err(e) => return Err(io_error(document, e)),
        };
        decode(document, &bytes)
    }

    async fn exists(&self, document: &str) -> Result<bool, IndexError> {
        let path = self.path_for(document)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(document, e))
    }
}
