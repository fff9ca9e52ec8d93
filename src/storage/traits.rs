//! Storage traits and error types
//!
//! Two collaborators live behind these traits: the exact seen-set that
//! arbitrates Bloom filter hits, and the content store that receives every
//! fetched document.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Exact membership set for normalized URLs
///
/// This is the source of truth for deduplication. Implementations must be
/// safe to call from many workers at once.
pub trait SeenStore: Send + Sync {
    /// Returns true if `key` has been inserted before
    fn contains(&self, key: &str) -> StorageResult<bool>;

    /// Inserts `key`, returning true if it was not present
    fn insert(&self, key: &str) -> StorageResult<bool>;

    /// Number of keys stored
    fn len(&self) -> StorageResult<u64>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// A fetched document handed to the content store
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub url: &'a str,
    pub status: u16,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    pub fetched_at: DateTime<Utc>,
}

impl Document<'_> {
    /// Content key: hex SHA-256 of `url|timestamp`
    ///
    /// Storing the same URL at the same timestamp twice yields the same key,
    /// which is what makes `ContentStore::store` idempotent.
    pub fn key(&self) -> String {
        document_key(self.url, self.fetched_at)
    }

    /// Headers rendered as `name: value` lines
    pub fn header_text(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Computes the content key for a URL fetched at `fetched_at`
pub fn document_key(url: &str, fetched_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"|");
    hasher.update(fetched_at.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

/// Receives fetched documents
pub trait ContentStore: Send + Sync {
    /// Persists a document and returns its key
    ///
    /// Must be idempotent for the same URL and timestamp.
    fn store(&self, document: &Document<'_>) -> StorageResult<String>;

    /// Number of documents stored
    fn count(&self) -> StorageResult<u64>;
}
