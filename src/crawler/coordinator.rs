//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires the components together and contains the per-lease
//! pipeline the workers run:
//! - robots.txt check for the leased URL
//! - Fetch, then hand the body to the content store
//! - Extract links, score them and route each one to its owning shard
//! - Route redirect targets the same way, so each hop is checked again
//! - Resolve the lease (done, retry or drop)
//!
//! Links are routed before the lease resolves, so the frontier can never look
//! exhausted while discovered links are still on their way in.

use crate::config::{Config, SeedEntry};
use crate::crawler::fetcher::{Disposition, FetchOutcome, FetchResult, Fetcher, HttpFetcher};
use crate::crawler::frontier::{EnqueueOutcome, Frontier, FrontierEntry, Lease};
use crate::crawler::parser::parse_page;
use crate::crawler::politeness::{HostStateStore, InMemoryHostStore, PolitenessGate};
use crate::crawler::priority::{Priority, PriorityScorer};
use crate::crawler::shard::{ShardForwarder, ShardMessage, ShardRing};
use crate::crawler::worker::WorkerPool;
use crate::dedup::SeenFilter;
use crate::output::{CrawlReport, CrawlStats};
use crate::robots::{HttpRobotsFetcher, RobotsCache, RobotsFetcher};
use crate::state::{DropReason, EntryState};
use crate::storage::{open_stores, ContentStore, Document, SeenStore};
use crate::url::{normalize_url, NormalizedUrl};
use crate::CrawlError;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Shard ring plus the transport to the other shards
struct ShardRouting {
    ring: ShardRing,
    forwarder: Arc<dyn ShardForwarder>,
}

/// Shared state every worker runs leases against
pub struct CrawlContext {
    frontier: Arc<Frontier>,
    gate: Arc<PolitenessGate>,
    robots: Arc<RobotsCache>,
    fetcher: Arc<dyn Fetcher>,
    content: Arc<dyn ContentStore>,
    scorer: PriorityScorer,
    shard: Option<ShardRouting>,
    stats: Arc<CrawlStats>,
    user_agent: String,
    max_depth: u32,
    max_redirects: u32,
    idle_backoff: Duration,
    keep_running: bool,
    fatal: Mutex<Option<CrawlError>>,
    stop: Arc<watch::Sender<bool>>,
}

impl CrawlContext {
    pub(crate) fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    /// Distributed shards keep polling after their frontier drains
    pub(crate) fn keeps_running(&self) -> bool {
        self.keep_running
    }

    pub(crate) fn idle_backoff(&self) -> Duration {
        self.idle_backoff
    }

    /// Records a fatal error and stops the run; the first error wins
    pub(crate) fn escalate(&self, e: CrawlError) {
        error!("Fatal: {}", e);
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(e);
        }
        self.stop.send_replace(true);
    }

    fn take_fatal(&self) -> Option<CrawlError> {
        self.fatal.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) fn record_lease_panic(&self) {
        self.stats.record_lease_panic();
    }

    /// Runs one leased entry to resolution
    ///
    /// Only fatal errors are returned; every per-URL failure ends in a lease
    /// resolution instead.
    pub(crate) async fn process(&self, mut lease: Lease) -> Result<(), CrawlError> {
        let url = lease.url().clone();
        let host = url.host_key();

        let lookup = self.robots.lookup(&url).await;
        self.gate
            .apply_crawl_delay(&host, lookup.rules.crawl_delay(&self.user_agent));

        if !lookup.rules.is_allowed(&url.robots_path(), &self.user_agent) {
            if !lookup.fetched {
                lease.release_unused();
            }
            info!("URL {} disallowed by robots.txt", url);
            self.stats.record(lease.drop_entry(DropReason::RobotsDisallowed));
            return Ok(());
        }

        if lookup.fetched {
            // The robots.txt request used this host's slot
            debug!("Fetched robots.txt for {}, deferring {}", host, url);
            self.stats.record(lease.defer());
            return Ok(());
        }

        debug!("Fetching {}", url);
        let mut result = self.fetcher.fetch(&url).await;

        if let FetchOutcome::HttpError { retry_after, .. } = &result.outcome {
            if result.outcome.is_rate_limited() {
                info!("{} is rate limiting us, backing off", host);
                self.gate.back_off(&host, *retry_after);
            }
        }

        match result.outcome.disposition() {
            Disposition::Done => match result.redirect_target() {
                Some(target) => {
                    let status = result.status().unwrap_or_default();
                    match self.follow_redirect(lease.entry(), target, status).await? {
                        // The hop itself is not a fetched page
                        None => {
                            lease.complete();
                        }
                        Some(reason) => {
                            warn!("Dropping {}: {}", url, reason);
                            self.stats.record(lease.drop_entry(reason));
                        }
                    }
                }
                None => {
                    self.store(&result);
                    result.links = self.extract_links(&result);
                    self.route_links(lease.entry(), &result.links).await?;
                    self.stats.record(lease.complete());
                }
            },
            Disposition::Retry => {
                let attempt = lease.entry().attempt_count + 1;
                if let Some(e) = result.outcome.to_error(&url) {
                    debug!("Attempt {} failed: {}", attempt, e);
                }
                let state = lease.retry();
                if state == EntryState::Dropped(DropReason::RetriesExhausted) {
                    warn!("Giving up on {} after {} attempts", url, attempt);
                }
                self.stats.record(state);
            }
            Disposition::Drop(reason) => {
                warn!("Dropping {}: {}", url, reason);
                self.stats.record(lease.drop_entry(reason));
            }
        }

        Ok(())
    }

    fn store(&self, result: &FetchResult) {
        let (Some(body), Some(status)) = (&result.body, result.status()) else {
            return;
        };

        let document = Document {
            url: result.url.as_str(),
            status,
            headers: &result.headers,
            body: body.as_slice(),
            fetched_at: result.fetched_at,
        };
        match self.content.store(&document) {
            Ok(key) => {
                debug!("Stored {} as {}", result.url, key);
                self.stats.record_stored();
            }
            Err(e) => {
                warn!("Failed to store {}: {}", result.url, e);
                self.stats.record_store_error();
            }
        }
    }

    fn extract_links(&self, result: &FetchResult) -> Vec<NormalizedUrl> {
        let Some(body) = &result.body else {
            return Vec::new();
        };
        if result.truncated {
            debug!("Body of {} truncated, links may be missing", result.url);
        }

        match parse_page(body, result.url.as_url()) {
            Ok(page) => {
                debug!(
                    "{} ({}): {} links",
                    result.url,
                    page.title.as_deref().unwrap_or("untitled"),
                    page.links.len()
                );
                page.links
            }
            Err(e) => {
                warn!("Could not extract links from {}: {}", result.url, e);
                self.stats.record_parse_error();
                Vec::new()
            }
        }
    }

    async fn route_links(
        &self,
        parent: &FrontierEntry,
        links: &[NormalizedUrl],
    ) -> Result<(), CrawlError> {
        let depth = parent.depth + 1;
        if depth > self.max_depth {
            for _ in links {
                self.stats.record_depth_limited();
            }
            return Ok(());
        }

        for link in links {
            self.route(link.clone(), None, depth, 0).await?;
        }
        Ok(())
    }

    /// Routes the target of a 3xx response like a discovered link
    ///
    /// The target keeps the parent's depth and priority and carries one more
    /// redirect hop, so robots.txt, politeness and dedup all apply to it.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The target was routed (or was already known)
    /// * `Ok(Some(reason))` - The hop is refused and the entry should be dropped
    async fn follow_redirect(
        &self,
        from: &FrontierEntry,
        target: &Url,
        status: u16,
    ) -> Result<Option<DropReason>, CrawlError> {
        let hops = from.redirects + 1;
        if hops > self.max_redirects {
            return Ok(Some(DropReason::TooManyRedirects));
        }

        let url = match normalize_url(target.as_str()) {
            Ok(url) => url,
            Err(e) => {
                warn!("{} redirects to unusable {}: {}", from.url, target, e);
                self.stats.record_invalid_url();
                return Ok(Some(DropReason::HttpError(status)));
            }
        };

        debug!("{} redirects ({}) to {}", from.url, status, url);
        self.stats.record_redirect();
        self.route(url, Some(from.priority), from.depth, hops).await?;
        Ok(None)
    }

    /// Enqueues `url` locally or forwards it to the shard owning its host
    ///
    /// Only a failing seen store is an error; everything else is counted.
    ///
    /// # Arguments
    ///
    /// * `url` - The normalized URL
    /// * `priority` - A fixed tier, or `None` to derive it from the score
    /// * `depth` - Link hops from the seed
    /// * `redirects` - Redirect hops that led to `url`
    async fn route(
        &self,
        url: NormalizedUrl,
        priority: Option<Priority>,
        depth: u32,
        redirects: u32,
    ) -> Result<(), CrawlError> {
        let (tier, score) = self.scorer.assign(&url, depth);
        let priority = priority.unwrap_or(tier);
        let host = url.host_key();

        if let Some(shard) = &self.shard {
            if !shard.ring.is_local(&host) {
                let peer = shard.ring.owner(&host).to_string();
                let message = ShardMessage {
                    host,
                    url,
                    priority,
                    depth,
                    redirects,
                };
                match shard.forwarder.forward(&peer, message).await {
                    Ok(()) => self.stats.record_forwarded(),
                    Err(e) => {
                        warn!("Forwarding to {} failed: {}", peer, e);
                        self.stats.record_forward_error();
                    }
                }
                return Ok(());
            }
        }

        let mut entry = FrontierEntry::new(url, priority, score, depth);
        entry.redirects = redirects;
        match self.frontier.enqueue(entry)? {
            EnqueueOutcome::Enqueued => self.stats.record_enqueued(),
            EnqueueOutcome::AlreadySeen => self.stats.record_duplicate(),
        }
        Ok(())
    }

    async fn ingest(&self, message: ShardMessage) -> Result<(), CrawlError> {
        self.stats.record_ingested();
        self.route(
            message.url,
            Some(message.priority),
            message.depth,
            message.redirects,
        )
        .await
    }
}

/// Stops a running crawl
///
/// Workers finish the fetch they are in, then exit.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    /// Asks the workers to exit after their current lease
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Builds a [`Coordinator`] with injectable collaborators
///
/// Anything not injected is built from the configuration.
pub struct CoordinatorBuilder {
    config: Config,
    seen_store: Option<Arc<dyn SeenStore>>,
    content_store: Option<Arc<dyn ContentStore>>,
    host_store: Option<Arc<dyn HostStateStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    robots_fetcher: Option<Arc<dyn RobotsFetcher>>,
    forwarder: Option<Arc<dyn ShardForwarder>>,
    inbox: Option<mpsc::Receiver<ShardMessage>>,
}

impl CoordinatorBuilder {
    pub fn seen_store(mut self, store: Arc<dyn SeenStore>) -> Self {
        self.seen_store = Some(store);
        self
    }

    pub fn content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.content_store = Some(store);
        self
    }

    pub fn host_store(mut self, store: Arc<dyn HostStateStore>) -> Self {
        self.host_store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn robots_fetcher(mut self, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        self.robots_fetcher = Some(fetcher);
        self
    }

    /// Transport to peer shards; required when `[shard]` is configured
    pub fn forwarder(mut self, forwarder: Arc<dyn ShardForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// This shard's ingestion endpoint
    ///
    /// With an inbox the run does not end when the frontier drains; it runs
    /// until stopped.
    pub fn inbox(mut self, inbox: mpsc::Receiver<ShardMessage>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn build(self) -> Result<Coordinator, CrawlError> {
        let config = self.config;

        let (seen_store, content_store) = match (self.seen_store, self.content_store) {
            (Some(seen), Some(content)) => (seen, content),
            (seen, content) => {
                let path = config.storage.database_path.as_deref().map(Path::new);
                let (default_seen, default_content) = open_stores(path)?;
                (
                    seen.unwrap_or(default_seen),
                    content.unwrap_or(default_content),
                )
            }
        };

        let host_store = match self.host_store {
            Some(store) => store,
            None => Arc::new(InMemoryHostStore::new(config.crawler.max_tracked_hosts)),
        };

        let user_agent = config.user_agent.header_value();

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&config)?),
        };

        let robots_fetcher: Arc<dyn RobotsFetcher> = match self.robots_fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpRobotsFetcher::new(
                &user_agent,
                Duration::from_millis(config.robots.fetch_timeout_ms),
                config.robots.max_bytes,
            )?),
        };

        let shard = match &config.shard {
            Some(shard_config) => {
                let ring = ShardRing::new(shard_config)?;
                let forwarder = self.forwarder.ok_or_else(|| {
                    CrawlError::Shard("[shard] is configured but no forwarder was given".to_string())
                })?;
                info!(
                    "Shard {} of {} peers",
                    ring.local_id(),
                    ring.peers().len()
                );
                Some(ShardRouting { ring, forwarder })
            }
            None => None,
        };

        let seen = Arc::new(SeenFilter::new(&config.dedup, seen_store));
        let gate = Arc::new(PolitenessGate::new(&config.crawler, host_store));
        let frontier = Arc::new(Frontier::new(&config.crawler, seen, gate.clone()));
        let robots = Arc::new(RobotsCache::new(&config.robots, &user_agent, robots_fetcher));
        let (stop, _) = watch::channel(false);
        let stop = Arc::new(stop);

        let context = Arc::new(CrawlContext {
            frontier,
            gate,
            robots,
            fetcher,
            content: content_store,
            scorer: PriorityScorer::new(config.priority.clone()),
            shard,
            stats: Arc::new(CrawlStats::new()),
            user_agent,
            max_depth: config.crawler.max_depth,
            max_redirects: config.crawler.max_redirects,
            idle_backoff: Duration::from_millis(config.crawler.idle_backoff_ms),
            keep_running: self.inbox.is_some(),
            fatal: Mutex::new(None),
            stop: stop.clone(),
        });

        Ok(Coordinator {
            workers: config.crawler.workers,
            context,
            inbox: self.inbox,
            stop,
        })
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    workers: usize,
    context: Arc<CrawlContext>,
    inbox: Option<mpsc::Receiver<ShardMessage>>,
    stop: Arc<watch::Sender<bool>>,
}

impl Coordinator {
    pub fn builder(config: Config) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            seen_store: None,
            content_store: None,
            host_store: None,
            fetcher: None,
            robots_fetcher: None,
            forwarder: None,
            inbox: None,
        }
    }

    /// Builds a coordinator with every collaborator taken from the configuration
    pub fn new(config: Config) -> Result<Self, CrawlError> {
        Self::builder(config).build()
    }

    /// Enqueues the seed URLs at depth 0
    ///
    /// Seeds without a priority start in the high tier.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Seed URLs with optional priority overrides
    ///
    /// # Returns
    ///
    /// How many seeds were valid URLs; invalid ones are counted and skipped
    pub async fn seed(&self, seeds: &[SeedEntry]) -> Result<usize, CrawlError> {
        let mut accepted = 0;
        for seed in seeds {
            let url = match normalize_url(&seed.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping seed {}: {}", seed.url, e);
                    self.context.stats.record_invalid_url();
                    continue;
                }
            };
            let priority = seed.priority.unwrap_or(Priority::High);
            self.context.route(url, Some(priority), 0, 0).await?;
            accepted += 1;
        }
        info!("Seeded {} URLs", accepted);
        Ok(accepted)
    }

    /// Accepts a URL forwarded by a peer shard
    pub async fn ingest(&self, message: ShardMessage) -> Result<(), CrawlError> {
        self.context.ingest(message).await
    }

    /// A handle that stops [`run`](Self::run) from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.context.frontier
    }

    pub fn gate(&self) -> &Arc<PolitenessGate> {
        &self.context.gate
    }

    pub fn robots(&self) -> &Arc<RobotsCache> {
        &self.context.robots
    }

    /// Runs the crawl until the frontier is exhausted or the run is stopped
    ///
    /// Returns the aggregate report, or the fatal error that ended the run.
    pub async fn run(mut self) -> Result<CrawlReport, CrawlError> {
        let started = Instant::now();
        info!(
            "Starting crawl with {} workers, {} URLs queued",
            self.workers,
            self.context.frontier.queued()
        );

        let stop = self.stop.subscribe();
        let ingestion = self
            .inbox
            .take()
            .map(|inbox| tokio::spawn(ingest_loop(self.context.clone(), inbox, stop.clone())));

        WorkerPool::spawn(self.workers, self.context.clone(), stop)
            .join()
            .await;

        let stop_requested = self.stop.send_replace(true);
        if let Some(task) = ingestion {
            if let Err(e) = task.await {
                error!("Ingestion task failed: {}", e);
            }
        }

        let frontier = &self.context.frontier;
        let report = self
            .context
            .stats
            .report(started.elapsed(), frontier.seen_fill_ratio());
        if let Some(e) = self.context.take_fatal() {
            return Err(e);
        }
        if !stop_requested && !frontier.is_exhausted() {
            let remaining = frontier.queued() + frontier.in_flight();
            error!("All workers exited with {} URLs unfinished", remaining);
            return Err(CrawlError::Incomplete { remaining });
        }

        info!(
            "Crawl completed: {} pages fetched in {:?}, seen filter {:.1}% full",
            report.fetched,
            report.elapsed,
            report.seen_fill_ratio * 100.0
        );
        Ok(report)
    }
}

/// Feeds URLs from peer shards into the local frontier until stopped
async fn ingest_loop(
    ctx: Arc<CrawlContext>,
    mut inbox: mpsc::Receiver<ShardMessage>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            message = inbox.recv() => {
                let Some(message) = message else {
                    break;
                };
                if let Err(e) = ctx.ingest(message).await {
                    if e.is_fatal() {
                        ctx.escalate(e);
                        break;
                    }
                    warn!("Ingest failed: {}", e);
                }
            }
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
