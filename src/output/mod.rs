//! Output module for crawl run reporting
//!
//! The crawl run reports aggregate counts (fetched, dropped by robots,
//! dropped after errors, requeued) rather than surfacing individual per-URL
//! errors as failures of the run.

pub mod stats;

pub use stats::{print_report, CrawlReport, CrawlStats};
