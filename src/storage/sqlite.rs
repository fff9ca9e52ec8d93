//! SQLite storage implementation
//!
//! One connection behind a mutex serves both the seen-set and the content
//! store. Statements are short, so contention stays low at crawler rates.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ContentStore, Document, SeenStore, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    /// Loads a stored document body by key
    pub fn document_body(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// URLs of every stored document, oldest first
    pub fn document_urls(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT url FROM documents ORDER BY fetched_at, url")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }
}

impl SeenStore for SqliteStorage {
    fn contains(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM seen_urls WHERE url = ?1",
                params![key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO seen_urls (url, first_seen_at) VALUES (?1, ?2)",
            params![key, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    fn len(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM seen_urls", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl ContentStore for SqliteStorage {
    fn store(&self, document: &Document<'_>) -> StorageResult<String> {
        let key = document.key();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO documents (key, url, status, headers, body, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key,
                document.url,
                document.status,
                document.header_text(),
                document.body,
                document.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(key)
    }

    fn count(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
