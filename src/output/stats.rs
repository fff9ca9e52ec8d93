//! Run statistics
//!
//! Per-URL failures never fail a run; they show up here as counts instead.
//! Workers bump the atomic counters in [`CrawlStats`] and the coordinator
//! turns them into a [`CrawlReport`] when the run ends.

use crate::state::{DropReason, EntryState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters shared by all workers
#[derive(Debug, Default)]
pub struct CrawlStats {
    fetched: AtomicU64,
    requeued: AtomicU64,
    dropped_robots: AtomicU64,
    dropped_terminal: AtomicU64,
    retries_exhausted: AtomicU64,
    invalid_urls: AtomicU64,
    duplicates: AtomicU64,
    depth_limited: AtomicU64,
    enqueued: AtomicU64,
    forwarded: AtomicU64,
    forward_errors: AtomicU64,
    ingested: AtomicU64,
    redirects: AtomicU64,
    lease_panics: AtomicU64,
    parse_errors: AtomicU64,
    stored: AtomicU64,
    store_errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a lease resolution
    pub fn record(&self, state: EntryState) {
        match state {
            EntryState::Done => bump(&self.fetched),
            EntryState::Requeued => bump(&self.requeued),
            EntryState::Dropped(reason) => self.record_drop(reason),
            EntryState::Queued | EntryState::InFlight => {}
        }
    }

    fn record_drop(&self, reason: DropReason) {
        if reason.is_policy() {
            bump(&self.dropped_robots);
        } else {
            bump(&self.dropped_terminal);
            if reason == DropReason::RetriesExhausted {
                bump(&self.retries_exhausted);
            }
        }
    }

    pub fn record_invalid_url(&self) {
        bump(&self.invalid_urls);
    }

    pub fn record_duplicate(&self) {
        bump(&self.duplicates);
    }

    pub fn record_depth_limited(&self) {
        bump(&self.depth_limited);
    }

    pub fn record_enqueued(&self) {
        bump(&self.enqueued);
    }

    pub fn record_forwarded(&self) {
        bump(&self.forwarded);
    }

    /// A link owned by a peer shard that could not be handed over
    pub fn record_forward_error(&self) {
        bump(&self.forward_errors);
    }

    /// A 3xx response whose target went back through routing
    pub fn record_redirect(&self) {
        bump(&self.redirects);
    }

    /// Processing of a lease panicked; the lease was requeued as a retry
    pub fn record_lease_panic(&self) {
        bump(&self.lease_panics);
    }

    pub fn record_ingested(&self) {
        bump(&self.ingested);
    }

    pub fn record_parse_error(&self) {
        bump(&self.parse_errors);
    }

    pub fn record_stored(&self) {
        bump(&self.stored);
    }

    pub fn record_store_error(&self) {
        bump(&self.store_errors);
    }

    pub fn fetched(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
    }

    /// Snapshots the counters
    ///
    /// # Arguments
    ///
    /// * `elapsed` - Run time so far
    /// * `seen_fill_ratio` - Share of Bloom filter bits set, from the seen filter
    pub fn report(&self, elapsed: Duration, seen_fill_ratio: f64) -> CrawlReport {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CrawlReport {
            fetched: load(&self.fetched),
            requeued: load(&self.requeued),
            dropped_robots: load(&self.dropped_robots),
            dropped_terminal: load(&self.dropped_terminal),
            retries_exhausted: load(&self.retries_exhausted),
            invalid_urls: load(&self.invalid_urls),
            duplicates: load(&self.duplicates),
            depth_limited: load(&self.depth_limited),
            enqueued: load(&self.enqueued),
            forwarded: load(&self.forwarded),
            forward_errors: load(&self.forward_errors),
            ingested: load(&self.ingested),
            redirects: load(&self.redirects),
            lease_panics: load(&self.lease_panics),
            parse_errors: load(&self.parse_errors),
            stored: load(&self.stored),
            store_errors: load(&self.store_errors),
            seen_fill_ratio,
            elapsed,
        }
    }
}

/// Aggregate outcome of a crawl run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// Pages fetched successfully
    pub fetched: u64,

    /// Retryable failures sent back to the frontier
    pub requeued: u64,

    /// URLs refused by robots.txt
    pub dropped_robots: u64,

    /// URLs dropped after a terminal error or the retry ceiling
    pub dropped_terminal: u64,

    /// Subset of `dropped_terminal` that hit the retry ceiling
    pub retries_exhausted: u64,

    /// Links and seeds that failed to normalize
    pub invalid_urls: u64,

    /// Links already scheduled earlier
    pub duplicates: u64,

    /// Links beyond `max-depth`
    pub depth_limited: u64,

    /// New frontier entries, seeds included
    pub enqueued: u64,

    /// Links handed to the shard that owns their host
    pub forwarded: u64,

    /// Links owned by a peer shard that were lost because forwarding failed
    pub forward_errors: u64,

    /// Links received from peer shards
    pub ingested: u64,

    /// Redirect responses; their targets are routed like discovered links
    pub redirects: u64,

    /// Leases whose processing panicked
    pub lease_panics: u64,

    /// Bodies the link extractor could not read
    pub parse_errors: u64,

    /// Documents written to the content store
    pub stored: u64,

    pub store_errors: u64,

    /// Share of the seen filter's Bloom bits that are set
    pub seen_fill_ratio: f64,

    /// Wall-clock run time
    pub elapsed: Duration,
}

impl CrawlReport {
    /// Pages per second over the whole run
    pub fn fetch_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.fetched as f64 / secs
        } else {
            0.0
        }
    }
}

/// Prints a report to stdout in a formatted manner
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Fetching:");
    println!("  Fetched: {}", report.fetched);
    println!("  Requeued (retryable failures): {}", report.requeued);
    println!("  Dropped by robots.txt: {}", report.dropped_robots);
    println!(
        "  Dropped after errors: {} ({} hit the retry ceiling)",
        report.dropped_terminal, report.retries_exhausted
    );
    println!();

    println!("Discovery:");
    println!("  Enqueued: {}", report.enqueued);
    println!("  Duplicates skipped: {}", report.duplicates);
    println!("  Beyond max depth: {}", report.depth_limited);
    println!("  Redirects followed: {}", report.redirects);
    println!("  Invalid URLs: {}", report.invalid_urls);
    println!("  Unreadable bodies: {}", report.parse_errors);
    if report.forwarded > 0 || report.ingested > 0 || report.forward_errors > 0 {
        println!("  Forwarded to peer shards: {}", report.forwarded);
        println!("  Lost forwarding to peers: {}", report.forward_errors);
        println!("  Received from peer shards: {}", report.ingested);
    }
    println!("  Seen filter fill: {:.2}%", report.seen_fill_ratio * 100.0);
    println!();

    println!("Storage:");
    println!("  Documents stored: {}", report.stored);
    if report.store_errors > 0 {
        println!("  Store failures: {}", report.store_errors);
    }
    println!();

    if report.lease_panics > 0 {
        println!("Worker panics (URLs requeued): {}\n", report.lease_panics);
    }

    println!(
        "Elapsed: {:.1}s ({:.2} pages/sec)",
        report.elapsed.as_secs_f64(),
        report.fetch_rate()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_resolutions() {
        let stats = CrawlStats::new();
        stats.record(EntryState::Done);
        stats.record(EntryState::Done);
        stats.record(EntryState::Requeued);
        stats.record(EntryState::Dropped(DropReason::RobotsDisallowed));
        stats.record(EntryState::Dropped(DropReason::HttpError(404)));
        stats.record(EntryState::Dropped(DropReason::RetriesExhausted));

        let report = stats.report(Duration::from_secs(1), 0.0);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.requeued, 1);
        assert_eq!(report.dropped_robots, 1);
        assert_eq!(report.dropped_terminal, 2);
        assert_eq!(report.retries_exhausted, 1);
    }

    #[test]
    fn test_failure_counters() {
        let stats = CrawlStats::new();
        stats.record_forward_error();
        stats.record_redirect();
        stats.record_redirect();
        stats.record_lease_panic();

        let report = stats.report(Duration::from_secs(1), 0.25);
        assert_eq!(report.forward_errors, 1);
        assert_eq!(report.redirects, 2);
        assert_eq!(report.lease_panics, 1);
        assert_eq!(report.seen_fill_ratio, 0.25);
    }

    #[test]
    fn test_fetch_rate() {
        let report = CrawlReport {
            fetched: 30,
            elapsed: Duration::from_secs(10),
            ..CrawlReport::default()
        };
        assert!((report.fetch_rate() - 3.0).abs() < f64::EPSILON);
        assert_eq!(CrawlReport::default().fetch_rate(), 0.0);
    }
}
