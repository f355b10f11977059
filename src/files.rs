//! Port to the persistent file registry.
//!
//! The registry itself lives outside this service; the pipeline consumes
//! exactly two facts from it: whether a `(fileId, userId)` pair is owned,
//! and which file names a user has. The trait keeps that seam mockable;
//! the in-memory implementation backs tests and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

#[async_trait]
pub trait FileRegistry: Send + Sync {
    /// Does `user_id` own `file_id`?
    async fn owns(&self, file_id: &str, user_id: &str) -> Result<bool>;

    /// All file names uploaded by `user_id`. Empty means the user has no
    /// documents and retrieval can short-circuit.
    async fn file_names(&self, user_id: &str) -> Result<Vec<String>>;

    async fn file_count(&self, user_id: &str) -> Result<usize> {
        Ok(self.file_names(user_id).await?.len())
    }
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub file_id: String,
    pub file_name: String,
}

/// Process-local registry keyed by user.
#[derive(Default)]
pub struct InMemoryFileRegistry {
    by_user: RwLock<HashMap<String, Vec<FileEntry>>>,
}

impl InMemoryFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, user_id: &str, file_id: &str, file_name: &str) {
        self.by_user
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(FileEntry {
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
            });
    }
}

#[async_trait]
impl FileRegistry for InMemoryFileRegistry {
    async fn owns(&self, file_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .by_user
            .read()
            .get(user_id)
            .map(|files| files.iter().any(|f| f.file_id == file_id))
            .unwrap_or(false))
    }

    async fn file_names(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .by_user
            .read()
            .get(user_id)
            .map(|files| files.iter().map(|f| f.file_name.clone()).collect())
            .unwrap_or_default())
    }
}
