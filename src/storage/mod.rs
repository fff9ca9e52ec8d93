//! Storage module for persisting crawl data
//!
//! This module provides the two external collaborators of the crawl engine:
//! - The exact seen-URL set backing the Bloom filter
//! - The content store receiving fetched documents
//!
//! Both have a SQLite implementation (one database file) and an in-memory one.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::{MemoryContentStore, MemorySeenStore, StoredDocument};
pub use sqlite::SqliteStorage;
pub use traits::{
    document_key, ContentStore, Document, SeenStore, StorageError, StorageResult,
};

use std::path::Path;
use std::sync::Arc;

/// Opens the stores named by the configuration
///
/// With a database path both stores share one SQLite file; without one
/// both are in memory.
///
/// # Arguments
///
/// * `database_path` - SQLite file to open or create, if any
///
/// # Returns
///
/// The seen store and the content store, in that order
pub fn open_stores(
    database_path: Option<&Path>,
) -> StorageResult<(Arc<dyn SeenStore>, Arc<dyn ContentStore>)> {
    match database_path {
        Some(path) => {
            let storage = Arc::new(SqliteStorage::open(path)?);
            let seen: Arc<dyn SeenStore> = storage.clone();
            let content: Arc<dyn ContentStore> = storage;
            Ok((seen, content))
        }
        None => {
            let seen: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
            let content: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
            Ok((seen, content))
        }
    }
}
