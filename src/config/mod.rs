//! Configuration module for Ripple-Crawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section except `[user-agent]` is optional and falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [crawler]
//! workers = 16
//! max-concurrent-per-host = 1
//! default-crawl-delay-ms = 1000
//! retry-ceiling = 3
//!
//! [user-agent]
//! crawler-name = "RippleBot"
//! crawler-version = "0.1"
//! contact-url = "https://example.com/bot"
//! contact-email = "bot@example.com"
//!
//! [robots]
//! on-unreachable = "allow"
//!
//! [[seeds]]
//! url = "https://example.com/"
//! priority = "high"
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DedupConfig, HostWeight, PriorityConfig, RobotsConfig, SeedEntry,
    ShardConfig, StorageConfig, UnreachablePolicy, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
