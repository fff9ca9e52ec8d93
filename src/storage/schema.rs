//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Ripple-Crawl database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Exact set of normalized URLs ever scheduled
CREATE TABLE IF NOT EXISTS seen_urls (
    url TEXT PRIMARY KEY,
    first_seen_at TEXT NOT NULL
) WITHOUT ROWID;

-- Fetched documents, keyed by sha256(url|fetched_at)
CREATE TABLE IF NOT EXISTS documents (
    key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_url ON documents(url);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
