//! URL frontier: the scheduling core
//!
//! Entries are bucketed by priority tier, then by host. `dequeue` walks the
//! tiers from high to low and, inside a tier, walks hosts from a rotating
//! cursor, returning the first entry whose host the politeness gate admits.
//! One hot host with a long queue therefore never starves the others.
//!
//! Each leased entry is owned by a [`Lease`] until it is resolved as done,
//! retried or dropped. The frontier is exhausted only when nothing is queued
//! and nothing is leased.

use crate::config::CrawlerConfig;
use crate::crawler::politeness::{Acquisition, HostPermit, PolitenessGate};
use crate::crawler::Priority;
use crate::dedup::SeenFilter;
use crate::state::{DropReason, EntryState};
use crate::url::NormalizedUrl;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A URL waiting in the frontier
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: NormalizedUrl,
    pub priority: Priority,
    pub score: f32,
    /// Link hops from the seed that led here
    pub depth: u32,
    pub discovered_at: DateTime<Utc>,
    /// Failed fetch attempts so far
    pub attempt_count: u32,
    /// Redirect hops that led here; bounded by `max-redirects`
    pub redirects: u32,
    /// Retry back-off: not eligible before this instant
    pub not_before: Option<Instant>,
}

impl FrontierEntry {
    pub fn new(url: NormalizedUrl, priority: Priority, score: f32, depth: u32) -> Self {
        Self {
            url,
            priority,
            score,
            depth,
            discovered_at: Utc::now(),
            attempt_count: 0,
            redirects: 0,
            not_before: None,
        }
    }

    fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

/// Result of [`Frontier::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The URL was scheduled before; nothing changed
    AlreadySeen,
}

/// Result of [`Frontier::dequeue`]
#[derive(Debug)]
pub enum Dequeue {
    Leased(Lease),
    /// Work exists but no host is eligible; retry after roughly this long
    Wait(Duration),
    /// Nothing queued and nothing in flight: the crawl is finished
    Exhausted,
}

/// Per-host queues of one priority tier
#[derive(Debug, Default)]
struct HostQueues {
    queues: HashMap<String, VecDeque<FrontierEntry>>,
    /// Hosts in round-robin order
    order: Vec<String>,
    cursor: usize,
}

impl HostQueues {
    fn push(&mut self, entry: FrontierEntry) {
        let host = entry.url.host_key();
        if !self.queues.contains_key(&host) {
            self.order.push(host.clone());
        }
        self.queues.entry(host).or_default().push_back(entry);
    }

    /// Finds the next eligible entry, acquiring its host's politeness slot
    ///
    /// `shortest` collects the smallest wait hint seen along the way.
    fn take_eligible(
        &mut self,
        gate: &PolitenessGate,
        now: Instant,
        shortest: &mut Option<Duration>,
    ) -> Option<(FrontierEntry, HostPermit)> {
        let n = self.order.len();
        for step in 0..n {
            let idx = (self.cursor + step) % n;
            let host = &self.order[idx];
            let Some(queue) = self.queues.get_mut(host) else {
                continue;
            };

            let Some(pos) = queue.iter().position(|e| e.is_ready(now)) else {
                if let Some(at) = queue.iter().filter_map(|e| e.not_before).min() {
                    note_wait(shortest, at.saturating_duration_since(now));
                }
                continue;
            };

            let permit = match gate.try_acquire(host) {
                Acquisition::Acquired(permit) => permit,
                Acquisition::Wait(wait) => {
                    note_wait(shortest, wait);
                    continue;
                }
            };

            let Some(entry) = queue.remove(pos) else {
                continue;
            };

            if queue.is_empty() {
                let host = self.order.remove(idx);
                self.queues.remove(&host);
                // The next host slid into `idx`
                self.cursor = if self.order.is_empty() {
                    0
                } else {
                    idx % self.order.len()
                };
            } else {
                self.cursor = (idx + 1) % n;
            }
            return Some((entry, permit));
        }
        None
    }
}

fn note_wait(shortest: &mut Option<Duration>, wait: Duration) {
    *shortest = Some(shortest.map_or(wait, |current| current.min(wait)));
}

#[derive(Debug, Default)]
struct FrontierState {
    tiers: [HostQueues; 3],
    queued: usize,
    in_flight: usize,
}

impl FrontierState {
    fn push(&mut self, entry: FrontierEntry) {
        self.tiers[entry.priority.index()].push(entry);
        self.queued += 1;
    }
}

/// How a lease ends
#[derive(Debug, Clone, Copy)]
enum Resolution {
    Done,
    Retry,
    Drop(DropReason),
    /// Back into the queue without counting an attempt
    Defer,
}

/// Priority- and host-partitioned URL queue
pub struct Frontier {
    state: Mutex<FrontierState>,
    seen: Arc<SeenFilter>,
    gate: Arc<PolitenessGate>,
    notify: Notify,
    retry_ceiling: u32,
    retry_backoff: Duration,
    idle_wait: Duration,
}

impl Frontier {
    pub fn new(config: &CrawlerConfig, seen: Arc<SeenFilter>, gate: Arc<PolitenessGate>) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            seen,
            gate,
            notify: Notify::new(),
            retry_ceiling: config.retry_ceiling.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            idle_wait: Duration::from_millis(config.idle_backoff_ms),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a URL unless it was ever scheduled before
    ///
    /// The seen check and the mark are one atomic step, so of two concurrent
    /// calls for the same URL exactly one enqueues.
    ///
    /// # Returns
    ///
    /// [`EnqueueOutcome::Duplicate`] for a URL scheduled before, or an error
    /// when the seen store is unavailable
    pub fn enqueue(&self, entry: FrontierEntry) -> Result<EnqueueOutcome, CrawlError> {
        if !self.seen.check_and_mark(&entry.url)? {
            return Ok(EnqueueOutcome::AlreadySeen);
        }

        debug!("Enqueued {} ({}, depth {})", entry.url, entry.priority, entry.depth);
        self.lock().push(entry);
        self.notify.notify_waiters();
        Ok(EnqueueOutcome::Enqueued)
    }

    /// Leases the next eligible entry
    ///
    /// Higher tiers are tried first; within a tier only hosts whose
    /// politeness gate grants a slot are eligible.
    ///
    /// # Returns
    ///
    /// * `Dequeue::Leased` - An entry plus its host permit
    /// * `Dequeue::Wait` - Nothing eligible yet; retry after the hint
    /// * `Dequeue::Exhausted` - Nothing queued and nothing in flight
    pub fn dequeue(self: &Arc<Self>) -> Dequeue {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.queued == 0 {
            return if state.in_flight == 0 {
                Dequeue::Exhausted
            } else {
                Dequeue::Wait(self.idle_wait)
            };
        }

        let now = Instant::now();
        let mut shortest = None;
        let leased = state
            .tiers
            .iter_mut()
            .find_map(|tier| tier.take_eligible(&self.gate, now, &mut shortest));

        match leased {
            Some((entry, permit)) => {
                state.queued -= 1;
                state.in_flight += 1;
                drop(guard);
                Dequeue::Leased(Lease {
                    frontier: self.clone(),
                    entry,
                    permit: Some(permit),
                    resolved: false,
                })
            }
            None => Dequeue::Wait(shortest.unwrap_or(self.idle_wait)),
        }
    }

    /// Completes when an entry is enqueued or a lease is resolved
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Entries waiting to be leased
    pub fn queued(&self) -> usize {
        self.lock().queued
    }

    /// Entries currently leased
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Share of the seen filter's Bloom bits that are set
    pub fn seen_fill_ratio(&self) -> f64 {
        self.seen.bloom().fill_ratio()
    }

    /// True when nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        state.queued == 0 && state.in_flight == 0
    }

    fn retry_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(10);
        self.retry_backoff.saturating_mul(1 << exponent)
    }

    fn resolve(&self, entry: &FrontierEntry, resolution: Resolution) -> EntryState {
        let (outcome, requeue) = match resolution {
            Resolution::Done => (EntryState::Done, None),
            Resolution::Drop(reason) => (EntryState::Dropped(reason), None),
            Resolution::Defer => (EntryState::Queued, Some(entry.clone())),
            Resolution::Retry => {
                let attempts = entry.attempt_count + 1;
                if attempts >= self.retry_ceiling {
                    (EntryState::Dropped(DropReason::RetriesExhausted), None)
                } else {
                    let mut retry = entry.clone();
                    retry.attempt_count = attempts;
                    retry.not_before = Some(Instant::now() + self.retry_delay(attempts));
                    (EntryState::Requeued, Some(retry))
                }
            }
        };

        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            if let Some(entry) = requeue {
                state.push(entry);
            }
        }
        self.notify.notify_waiters();
        outcome
    }
}

/// Exclusive ownership of one in-flight entry
///
/// Holds the host's politeness slot until resolved. A lease dropped without
/// being resolved (for example while unwinding from a panic) counts as a
/// retryable failure.
pub struct Lease {
    frontier: Arc<Frontier>,
    entry: FrontierEntry,
    permit: Option<HostPermit>,
    resolved: bool,
}

impl Lease {
    pub fn entry(&self) -> &FrontierEntry {
        &self.entry
    }

    pub fn url(&self) -> &NormalizedUrl {
        &self.entry.url
    }

    /// Returns the politeness slot as unused; the lease stays open
    ///
    /// For outcomes decided without contacting the host.
    pub fn release_unused(&mut self) {
        if let Some(permit) = self.permit.take() {
            permit.mark_unused();
        }
    }

    /// Fetched successfully
    pub fn complete(mut self) -> EntryState {
        self.finish(Resolution::Done)
    }

    /// Retryable failure: requeue with back-off, or drop at the retry ceiling
    pub fn retry(mut self) -> EntryState {
        self.finish(Resolution::Retry)
    }

    /// Terminal failure or policy refusal
    pub fn drop_entry(mut self, reason: DropReason) -> EntryState {
        self.finish(Resolution::Drop(reason))
    }

    /// Puts the entry back untouched, e.g. after its slot went to robots.txt
    pub fn defer(mut self) -> EntryState {
        self.finish(Resolution::Defer)
    }

    fn finish(&mut self, resolution: Resolution) -> EntryState {
        self.resolved = true;
        // Release the host before touching the frontier lock
        drop(self.permit.take());
        self.frontier.resolve(&self.entry, resolution)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.resolved {
            warn!("Lease for {} dropped unresolved, retrying", self.entry.url);
            self.finish(Resolution::Retry);
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("entry", &self.entry)
            .field("resolved", &self.resolved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::crawler::politeness::InMemoryHostStore;
    use crate::storage::MemorySeenStore;
    use crate::url::normalize_url;

    fn frontier_with(delay_ms: u64, retry_ceiling: u32) -> Arc<Frontier> {
        let config = CrawlerConfig {
            default_crawl_delay_ms: delay_ms,
            max_concurrent_per_host: 1,
            retry_ceiling,
            retry_backoff_ms: 100,
            idle_backoff_ms: 50,
            ..CrawlerConfig::default()
        };
        let seen = Arc::new(SeenFilter::new(
            &DedupConfig {
                expected_urls: 1_000,
                false_positive_rate: 0.01,
            },
            Arc::new(MemorySeenStore::new()),
        ));
        let gate = Arc::new(PolitenessGate::new(
            &config,
            Arc::new(InMemoryHostStore::new(100)),
        ));
        Arc::new(Frontier::new(&config, seen, gate))
    }

    fn entry(url: &str, priority: Priority) -> FrontierEntry {
        FrontierEntry::new(normalize_url(url).unwrap(), priority, 1.0, 0)
    }

    fn lease(frontier: &Arc<Frontier>) -> Lease {
        match frontier.dequeue() {
            Dequeue::Leased(lease) => lease,
            other => panic!("expected a lease, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_is_idempotent() {
        let frontier = frontier_with(0, 3);
        assert_eq!(frontier.seen_fill_ratio(), 0.0);

        assert_eq!(
            frontier.enqueue(entry("http://a.test/x", Priority::High)).unwrap(),
            EnqueueOutcome::Enqueued
        );
        assert_eq!(
            frontier.enqueue(entry("http://a.test/x", Priority::Low)).unwrap(),
            EnqueueOutcome::AlreadySeen
        );
        assert_eq!(frontier.queued(), 1);
        assert!(frontier.seen_fill_ratio() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equivalent_links_collapse() {
        let frontier = frontier_with(0, 3);
        let base = ::url::Url::parse("http://a.test/").unwrap();

        for raw in ["/x", "http://a.test/x?"] {
            let url = crate::url::normalize(raw, Some(&base)).unwrap();
            frontier
                .enqueue(FrontierEntry::new(url, Priority::Medium, 0.8, 1))
                .unwrap();
        }
        assert_eq!(frontier.queued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_tier_first() {
        let frontier = frontier_with(0, 3);
        frontier.enqueue(entry("http://low.test/", Priority::Low)).unwrap();
        frontier.enqueue(entry("http://high.test/", Priority::High)).unwrap();
        frontier.enqueue(entry("http://mid.test/", Priority::Medium)).unwrap();

        let order: Vec<String> = (0..3)
            .map(|_| {
                let lease = lease(&frontier);
                let host = lease.url().host().to_string();
                lease.complete();
                host
            })
            .collect();
        assert_eq!(order, vec!["high.test", "mid.test", "low.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_across_hosts() {
        let frontier = frontier_with(0, 3);
        for url in [
            "http://hot.test/1",
            "http://hot.test/2",
            "http://hot.test/3",
            "http://b.test/1",
            "http://c.test/1",
        ] {
            frontier.enqueue(entry(url, Priority::High)).unwrap();
        }

        let mut hosts = Vec::new();
        for _ in 0..5 {
            let lease = lease(&frontier);
            hosts.push(lease.url().host().to_string());
            lease.complete();
        }
        assert_eq!(hosts, vec!["hot.test", "b.test", "c.test", "hot.test", "hot.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_hint_from_politeness() {
        let frontier = frontier_with(1000, 3);
        frontier.enqueue(entry("http://a.test/1", Priority::High)).unwrap();
        frontier.enqueue(entry("http://a.test/2", Priority::High)).unwrap();

        lease(&frontier).complete();
        match frontier.dequeue() {
            Dequeue::Wait(wait) => assert_eq!(wait, Duration::from_millis(1000)),
            other => panic!("expected wait, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_only_when_nothing_in_flight() {
        let frontier = frontier_with(0, 3);
        frontier.enqueue(entry("http://a.test/", Priority::High)).unwrap();

        let lease = lease(&frontier);
        assert!(matches!(frontier.dequeue(), Dequeue::Wait(_)));
        assert!(!frontier.is_exhausted());

        assert_eq!(lease.complete(), EntryState::Done);
        assert!(matches!(frontier.dequeue(), Dequeue::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_drops_entry() {
        let frontier = frontier_with(0, 3);
        frontier.enqueue(entry("http://a.test/flaky", Priority::High)).unwrap();

        assert_eq!(lease(&frontier).retry(), EntryState::Requeued);

        // Back-off: 100ms after the first failure
        assert!(matches!(frontier.dequeue(), Dequeue::Wait(_)));
        tokio::time::advance(Duration::from_millis(100)).await;
        let second = lease(&frontier);
        assert_eq!(second.entry().attempt_count, 1);
        assert_eq!(second.retry(), EntryState::Requeued);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(
            lease(&frontier).retry(),
            EntryState::Dropped(DropReason::RetriesExhausted)
        );
        assert!(matches!(frontier.dequeue(), Dequeue::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_lease_counts_as_retry() {
        let frontier = frontier_with(0, 3);
        frontier.enqueue(entry("http://a.test/", Priority::High)).unwrap();

        drop(lease(&frontier));
        assert_eq!(frontier.in_flight(), 0);
        assert_eq!(frontier.queued(), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(lease(&frontier).entry().attempt_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_keeps_attempts() {
        let frontier = frontier_with(0, 3);
        frontier.enqueue(entry("http://a.test/", Priority::High)).unwrap();

        assert_eq!(lease(&frontier).defer(), EntryState::Queued);
        assert_eq!(lease(&frontier).entry().attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_host_spacing() {
        let frontier = frontier_with(1000, 3);
        for i in 0..10 {
            frontier
                .enqueue(entry(&format!("http://a.test/{}", i), Priority::High))
                .unwrap();
        }

        let start = Instant::now();
        let mut starts = Vec::new();
        loop {
            match frontier.dequeue() {
                Dequeue::Leased(lease) => {
                    starts.push(Instant::now());
                    lease.complete();
                }
                Dequeue::Wait(wait) => tokio::time::sleep(wait).await,
                Dequeue::Exhausted => break,
            }
        }

        assert_eq!(starts.len(), 10);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
        assert!(start.elapsed() >= Duration::from_millis(9000));
    }
}
