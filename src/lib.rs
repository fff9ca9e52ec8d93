//! Ripple-Crawl: the scheduling core of a polite, distributed web crawler
//!
//! This crate decides what to fetch next, when a host may be fetched without
//! overloading it, whether a URL was already scheduled, and how discovered
//! links flow back into the queue. Content storage is a pluggable collaborator.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Ripple-Crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDisallowed { url: String },

    #[error("Request timeout for {url}")]
    FetchTimeout { url: String },

    #[error("Network error for {url}: {message}")]
    FetchNetworkError { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    FetchHttpError { url: String, status: u16 },

    #[error("Parse error: {0}")]
    Parse(#[from] crawler::ParseError),

    /// The exact seen-set could not be reached; dedup is no longer sound
    #[error("Seen-URL store unavailable: {0}")]
    SeenStoreUnavailable(#[source] storage::StorageError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// Every worker exited while URLs were still queued and no stop was requested
    #[error("Crawl ended early with {remaining} URLs left in the frontier")]
    Incomplete { remaining: usize },

    #[error("Shard transport error: {0}")]
    Shard(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Returns true if the whole run must stop because of this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SeenStoreUnavailable(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Ripple-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, Frontier, PolitenessGate};
pub use dedup::SeenFilter;
pub use output::CrawlReport;
pub use robots::{RobotsCache, RobotsRules};
pub use url::{normalize, normalize_url, NormalizedUrl};
