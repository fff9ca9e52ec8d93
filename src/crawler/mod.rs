//! Crawler module: scheduling, fetching and coordination
//!
//! This module contains the core crawling logic, including:
//! - Per-host politeness (`PolitenessGate`)
//! - The priority- and host-partitioned frontier
//! - HTTP fetching and link extraction
//! - The worker pool and the coordinator that routes discovered links
//! - Shard ownership for distributed crawls

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
pub mod politeness;
mod priority;
pub mod shard;
mod worker;

pub use coordinator::{Coordinator, CoordinatorBuilder, CrawlContext, StopHandle};
pub use fetcher::{build_http_client, Disposition, FetchOutcome, FetchResult, Fetcher, HttpFetcher};
pub use frontier::{Dequeue, EnqueueOutcome, Frontier, FrontierEntry, Lease};
pub use parser::{extract, parse_html, parse_page, ParseError, ParsedPage};
pub use politeness::{Acquisition, HostPermit, HostStateStore, InMemoryHostStore, PolitenessGate, SlotDecision};
pub use priority::{Priority, PriorityScorer};
pub use shard::{ChannelForwarder, ShardForwarder, ShardMessage, ShardRing};
pub use worker::WorkerPool;
