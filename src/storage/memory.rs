//! In-memory stores for tests and single-process runs

use crate::storage::traits::{ContentStore, Document, SeenStore, StorageResult};
use dashmap::{DashMap, DashSet};

/// Exact seen-set held in a concurrent hash set
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    keys: DashSet<String>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenStore for MemorySeenStore {
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.keys.contains(key))
    }

    fn insert(&self, key: &str) -> StorageResult<bool> {
        Ok(self.keys.insert(key.to_string()))
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.keys.len() as u64)
    }
}

/// A document as kept by [`MemoryContentStore`]
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

/// Content store that keeps documents in memory
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    documents: DashMap<String, StoredDocument>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored URLs, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .documents
            .iter()
            .map(|entry| entry.value().url.clone())
            .collect();
        urls.sort();
        urls
    }

    /// All stored documents, in no particular order
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.documents.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn get(&self, key: &str) -> Option<StoredDocument> {
        self.documents.get(key).map(|entry| entry.value().clone())
    }
}

impl ContentStore for MemoryContentStore {
    fn store(&self, document: &Document<'_>) -> StorageResult<String> {
        let key = document.key();
        self.documents
            .entry(key.clone())
            .or_insert_with(|| StoredDocument {
                url: document.url.to_string(),
                status: document.status,
                body: document.body.to_vec(),
            });
        Ok(key)
    }

    fn count(&self) -> StorageResult<u64> {
        Ok(self.documents.len() as u64)
    }
}
