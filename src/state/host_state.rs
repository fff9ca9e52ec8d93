use std::time::Duration;
use tokio::time::Instant;

/// Politeness state of one host
///
/// Mutated only through a `HostStateStore`, under that store's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostState {
    pub host: String,

    /// Start time of the most recent fetch
    pub last_fetch_at: Option<Instant>,

    /// Effective minimum spacing between fetch starts
    pub crawl_delay: Duration,

    pub in_flight: u32,

    /// Set after an HTTP 429; no fetch starts before this instant
    pub backoff_until: Option<Instant>,
}

impl HostState {
    pub fn new(host: &str, crawl_delay: Duration) -> Self {
        Self {
            host: host.to_string(),
            last_fetch_at: None,
            crawl_delay,
            in_flight: 0,
            backoff_until: None,
        }
    }

    /// Earliest instant the next fetch may start, ignoring the in-flight cap
    pub fn next_allowed_at(&self) -> Option<Instant> {
        let after_delay = self.last_fetch_at.map(|at| at + self.crawl_delay);
        match (after_delay, self.backoff_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// How long until a fetch may start; `None` when one may start now
    ///
    /// When the in-flight cap is reached the hint is the remaining delay, or
    /// the whole crawl delay if that has already passed, since a slot frees up
    /// no sooner than the running fetch completes.
    pub fn wait_hint(&self, now: Instant, max_in_flight: u32) -> Option<Duration> {
        let delay_wait = self
            .next_allowed_at()
            .filter(|at| *at > now)
            .map(|at| at - now);

        if self.in_flight >= max_in_flight {
            return Some(delay_wait.unwrap_or(self.crawl_delay).max(Duration::from_millis(1)));
        }
        delay_wait
    }

    /// True when nothing is in flight and every delay has elapsed
    ///
    /// Forgetting such a host loses nothing: a fresh state would allow the
    /// same fetch at the same time.
    pub fn is_idle(&self, now: Instant) -> bool {
        self.in_flight == 0 && self.next_allowed_at().map_or(true, |at| at <= now)
    }

    /// Records the start of a fetch
    pub fn record_fetch(&mut self, now: Instant) {
        self.last_fetch_at = Some(now);
        self.in_flight += 1;
    }

    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
