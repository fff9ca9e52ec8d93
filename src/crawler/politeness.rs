//! Per-host politeness gate
//!
//! Every fetch start goes through [`PolitenessGate::try_acquire`], which
//! succeeds only if the host's crawl delay has elapsed since the previous
//! start and fewer than `max_concurrent_per_host` fetches are running. The
//! check and the bookkeeping happen in one critical section of the host
//! store, so two workers can never both win the last slot.

use crate::config::CrawlerConfig;
use crate::state::HostState;
use lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Decision of a [`HostStateStore`] acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    /// The fetch may start at `started_at`; `previous_fetch` is the host's
    /// prior `last_fetch_at`
    Granted {
        started_at: Instant,
        previous_fetch: Option<Instant>,
    },
    /// Not yet; try again after the hint
    Denied { wait: Duration },
}

/// Storage of per-host politeness state
///
/// Implementations must make each method atomic per host. The in-memory
/// store is the default; a distributed deployment can put each shard's slice
/// of hosts behind its own store.
pub trait HostStateStore: Send + Sync {
    /// Checks eligibility and, if granted, records the fetch start
    fn try_acquire(
        &self,
        host: &str,
        now: Instant,
        max_in_flight: u32,
        default_delay: Duration,
    ) -> SlotDecision;

    /// Ends a fetch
    fn release(&self, host: &str);

    /// Restores `last_fetch_at` after a granted slot did no network I/O
    ///
    /// Only takes effect while `last_fetch_at` is still `started_at`; a start
    /// recorded by a later permit is never rolled back.
    ///
    /// # Arguments
    ///
    /// * `host` - The host key the slot was granted for
    /// * `started_at` - The start the unused slot recorded
    /// * `previous` - The `last_fetch_at` the host had before that start
    fn restore_last_fetch(&self, host: &str, started_at: Instant, previous: Option<Instant>);

    fn set_crawl_delay(&self, host: &str, delay: Duration);

    /// Blocks new fetch starts on `host` until `until`
    fn back_off(&self, host: &str, until: Instant);

    fn snapshot(&self, host: &str) -> Option<HostState>;

    /// Number of hosts currently tracked
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// LRU-bounded in-memory host store
///
/// When the capacity is reached, the least recently used *idle* host is
/// forgotten: nothing in flight and every delay elapsed. Busy or cooling
/// hosts are never evicted, so the map may exceed its capacity briefly
/// rather than forget a constraint.
pub struct InMemoryHostStore {
    hosts: Mutex<LruCache<String, HostState>>,
    capacity: usize,
}

impl InMemoryHostStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            hosts: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
        }
    }

    fn hosts(&self) -> MutexGuard<'_, LruCache<String, HostState>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_idle(hosts: &mut LruCache<String, HostState>, capacity: usize, now: Instant) {
        while hosts.len() >= capacity {
            let victim = hosts
                .iter()
                .rev()
                .find(|(_, state)| state.is_idle(now))
                .map(|(host, _)| host.clone());
            match victim {
                Some(host) => {
                    debug!("Evicting idle host state {}", host);
                    hosts.pop(&host);
                }
                None => break,
            }
        }
    }
}

impl HostStateStore for InMemoryHostStore {
    fn try_acquire(
        &self,
        host: &str,
        now: Instant,
        max_in_flight: u32,
        default_delay: Duration,
    ) -> SlotDecision {
        let mut hosts = self.hosts();
        if !hosts.contains(host) {
            Self::evict_idle(&mut hosts, self.capacity, now);
            hosts.put(host.to_string(), HostState::new(host, default_delay));
        }
        let Some(state) = hosts.get_mut(host) else {
            return SlotDecision::Denied {
                wait: default_delay,
            };
        };

        match state.wait_hint(now, max_in_flight) {
            Some(wait) => SlotDecision::Denied { wait },
            None => {
                let previous_fetch = state.last_fetch_at;
                state.record_fetch(now);
                SlotDecision::Granted {
                    started_at: now,
                    previous_fetch,
                }
            }
        }
    }

    fn release(&self, host: &str) {
        if let Some(state) = self.hosts().peek_mut(host) {
            state.release();
        }
    }

    fn restore_last_fetch(&self, host: &str, started_at: Instant, previous: Option<Instant>) {
        if let Some(state) = self.hosts().peek_mut(host) {
            if state.last_fetch_at == Some(started_at) {
                state.last_fetch_at = previous;
            }
        }
    }

    fn set_crawl_delay(&self, host: &str, delay: Duration) {
        if let Some(state) = self.hosts().peek_mut(host) {
            state.crawl_delay = delay;
        }
    }

    fn back_off(&self, host: &str, until: Instant) {
        if let Some(state) = self.hosts().peek_mut(host) {
            state.backoff_until = Some(state.backoff_until.map_or(until, |b| b.max(until)));
        }
    }

    fn snapshot(&self, host: &str) -> Option<HostState> {
        self.hosts().peek(host).cloned()
    }

    fn len(&self) -> usize {
        self.hosts().len()
    }
}

/// Outcome of [`PolitenessGate::try_acquire`]
#[derive(Debug)]
pub enum Acquisition {
    Acquired(HostPermit),
    Wait(Duration),
}

/// Enforces crawl delay and the per-host concurrency cap
pub struct PolitenessGate {
    store: Arc<dyn HostStateStore>,
    max_in_flight: u32,
    default_delay: Duration,
    max_delay: Duration,
    rate_limit_backoff: Duration,
}

impl PolitenessGate {
    pub fn new(config: &CrawlerConfig, store: Arc<dyn HostStateStore>) -> Self {
        Self {
            store,
            max_in_flight: config.max_concurrent_per_host.max(1),
            default_delay: Duration::from_millis(config.default_crawl_delay_ms),
            max_delay: Duration::from_millis(config.max_crawl_delay_ms),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
        }
    }

    /// Tries to start a fetch on `host`
    ///
    /// On success the returned permit holds the slot until it is dropped.
    pub fn try_acquire(&self, host: &str) -> Acquisition {
        match self.store.try_acquire(
            host,
            Instant::now(),
            self.max_in_flight,
            self.default_delay,
        ) {
            SlotDecision::Granted {
                started_at,
                previous_fetch,
            } => Acquisition::Acquired(HostPermit {
                store: self.store.clone(),
                host: host.to_string(),
                started_at,
                previous_fetch,
                released: false,
            }),
            SlotDecision::Denied { wait } => Acquisition::Wait(wait),
        }
    }

    /// Ends a fetch on `host`
    ///
    /// Prefer dropping the [`HostPermit`]; this is for callers that track
    /// slots themselves.
    pub fn release(&self, host: &str) {
        self.store.release(host);
    }

    /// Applies a robots.txt Crawl-delay
    ///
    /// The effective delay is never below the configured default and never
    /// above the configured maximum.
    pub fn apply_crawl_delay(&self, host: &str, robots_delay: Option<Duration>) {
        let delay = self.effective_delay(robots_delay);
        self.store.set_crawl_delay(host, delay);
    }

    pub fn effective_delay(&self, robots_delay: Option<Duration>) -> Duration {
        robots_delay
            .map(|d| d.min(self.max_delay))
            .unwrap_or_default()
            .max(self.default_delay)
    }

    /// Reacts to HTTP 429: no new fetch on `host` before the back-off passes
    pub fn back_off(&self, host: &str, retry_after: Option<Duration>) {
        let wait = retry_after.unwrap_or(self.rate_limit_backoff);
        info!("Backing off {} for {:?}", host, wait);
        self.store.back_off(host, Instant::now() + wait);
    }

    pub fn snapshot(&self, host: &str) -> Option<HostState> {
        self.store.snapshot(host)
    }

    pub fn tracked_hosts(&self) -> usize {
        self.store.len()
    }
}

/// A held per-host fetch slot
///
/// Dropping the permit releases the slot, on every exit path including
/// timeouts, early returns and panics.
pub struct HostPermit {
    store: Arc<dyn HostStateStore>,
    host: String,
    started_at: Instant,
    previous_fetch: Option<Instant>,
    released: bool,
}

impl HostPermit {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Gives the slot back as if it had never been taken
    ///
    /// For slots that ended without contacting the host (for example a URL
    /// refused by cached robots rules), so the next fetch is not delayed.
    pub fn mark_unused(mut self) {
        self.store
            .restore_last_fetch(&self.host, self.started_at, self.previous_fetch);
        self.store.release(&self.host);
        self.released = true;
    }
}

impl Drop for HostPermit {
    fn drop(&mut self) {
        if !self.released {
            self.store.release(&self.host);
        }
    }
}

impl std::fmt::Debug for HostPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPermit")
            .field("host", &self.host)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(delay_ms: u64, per_host: u32) -> CrawlerConfig {
        CrawlerConfig {
            default_crawl_delay_ms: delay_ms,
            max_crawl_delay_ms: 10_000,
            max_concurrent_per_host: per_host,
            rate_limit_backoff_ms: 5_000,
            ..CrawlerConfig::default()
        }
    }

    fn gate(delay_ms: u64, per_host: u32, capacity: usize) -> PolitenessGate {
        PolitenessGate::new(
            &config(delay_ms, per_host),
            Arc::new(InMemoryHostStore::new(capacity)),
        )
    }

    fn acquired(acquisition: Acquisition) -> HostPermit {
        match acquisition {
            Acquisition::Acquired(permit) => permit,
            Acquisition::Wait(wait) => panic!("expected a permit, told to wait {:?}", wait),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_starts() {
        let gate = gate(1000, 1, 100);

        drop(acquired(gate.try_acquire("a.test")));

        match gate.try_acquire("a.test") {
            Acquisition::Wait(wait) => assert_eq!(wait, Duration::from_millis(1000)),
            Acquisition::Acquired(_) => panic!("delay not enforced"),
        }

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Wait(_)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Acquired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let gate = gate(0, 2, 100);

        let first = acquired(gate.try_acquire("a.test"));
        let _second = acquired(gate.try_acquire("a.test"));
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Wait(_)));

        drop(first);
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Acquired(_)));
        assert_eq!(gate.snapshot("a.test").unwrap().in_flight, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_independent() {
        let gate = gate(1000, 1, 100);
        let _a = acquired(gate.try_acquire("a.test"));
        let _b = acquired(gate.try_acquire("b.test"));
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Wait(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_released_on_panic() {
        let gate = Arc::new(gate(0, 1, 100));

        let task_gate = gate.clone();
        let result = tokio::spawn(async move {
            let _permit = acquired(task_gate.try_acquire("a.test"));
            panic!("fetch blew up");
        })
        .await;

        assert!(result.is_err());
        assert_eq!(gate.snapshot("a.test").unwrap().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_unused_restores_last_fetch() {
        let gate = gate(1000, 1, 100);

        drop(acquired(gate.try_acquire("a.test")));
        tokio::time::advance(Duration::from_millis(1000)).await;

        let permit = acquired(gate.try_acquire("a.test"));
        permit.mark_unused();

        // The unused slot does not push the next start out by another second
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Acquired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_unused_keeps_later_start() {
        let gate = gate(1000, 2, 100);

        let early = acquired(gate.try_acquire("a.test"));
        tokio::time::advance(Duration::from_millis(1000)).await;
        let _late = acquired(gate.try_acquire("a.test"));

        // Rolling back the early slot must not erase the later start
        early.mark_unused();
        match gate.try_acquire("a.test") {
            Acquisition::Wait(wait) => assert_eq!(wait, Duration::from_millis(1000)),
            Acquisition::Acquired(_) => panic!("crawl delay bypassed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_robots_delay_bounds() {
        let gate = gate(500, 1, 100);
        assert_eq!(gate.effective_delay(None), Duration::from_millis(500));
        assert_eq!(
            gate.effective_delay(Some(Duration::from_millis(100))),
            Duration::from_millis(500)
        );
        assert_eq!(
            gate.effective_delay(Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            gate.effective_delay(Some(Duration::from_secs(3600))),
            Duration::from_secs(10)
        );

        drop(acquired(gate.try_acquire("a.test")));
        gate.apply_crawl_delay("a.test", Some(Duration::from_secs(3)));
        assert_eq!(
            gate.snapshot("a.test").unwrap().crawl_delay,
            Duration::from_secs(3)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_off() {
        let gate = gate(0, 1, 100);
        drop(acquired(gate.try_acquire("a.test")));

        gate.back_off("a.test", Some(Duration::from_secs(7)));
        match gate.try_acquire("a.test") {
            Acquisition::Wait(wait) => assert_eq!(wait, Duration::from_secs(7)),
            Acquisition::Acquired(_) => panic!("back-off ignored"),
        }

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Acquired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_spares_busy_hosts() {
        let gate = gate(1000, 1, 2);

        let _busy = acquired(gate.try_acquire("a.test"));
        drop(acquired(gate.try_acquire("b.test")));
        tokio::time::advance(Duration::from_millis(1000)).await;

        // b.test is idle and past its delay, a.test still holds a slot
        drop(acquired(gate.try_acquire("c.test")));
        assert_eq!(gate.tracked_hosts(), 2);
        assert!(gate.snapshot("a.test").is_some());
        assert!(gate.snapshot("b.test").is_none());

        // Nothing is idle now: the store grows instead of forgetting a.test or c.test
        drop(acquired(gate.try_acquire("d.test")));
        assert_eq!(gate.tracked_hosts(), 3);
        assert!(matches!(gate.try_acquire("a.test"), Acquisition::Wait(_)));
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_cap() {
        let gate = Arc::new(gate(0, 2, 100));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let gate = gate.clone();
            handles.push(std::thread::spawn(move || {
                match gate.try_acquire("a.test") {
                    Acquisition::Acquired(permit) => Some(permit),
                    Acquisition::Wait(_) => None,
                }
            }));
        }
        let permits: Vec<HostPermit> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(permits.len(), 2);
        assert_eq!(gate.snapshot("a.test").unwrap().in_flight, 2);
    }
}
