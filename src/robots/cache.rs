//! Per-host robots.txt cache
//!
//! Each host has a slot holding the current `Arc<RobotsRules>`. Readers clone
//! the Arc; a refresh replaces it. Refreshes for one host are single-flight:
//! the first caller fetches while later callers wait on the slot's fetch lock
//! and then reuse what it stored.

use crate::config::{RobotsConfig, UnreachablePolicy};
use crate::robots::{RobotsFetcher, RobotsResponse, RobotsRules, RobotsSource};
use crate::url::NormalizedUrl;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Default)]
struct RobotsSlot {
    fetch_lock: tokio::sync::Mutex<()>,
    rules: RwLock<Option<Arc<RobotsRules>>>,
}

impl RobotsSlot {
    /// Current rules if present and not expired
    fn fresh(&self) -> Option<Arc<RobotsRules>> {
        let rules = self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        (!rules.is_expired(Utc::now())).then_some(rules)
    }

    /// Current rules even if expired
    fn any(&self) -> Option<Arc<RobotsRules>> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, rules: Arc<RobotsRules>) {
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = Some(rules);
    }
}

/// Result of a robots lookup
#[derive(Debug, Clone)]
pub struct RobotsLookup {
    pub rules: Arc<RobotsRules>,
    /// True when this call performed the network fetch
    pub fetched: bool,
}

/// Cache of robots.txt rules keyed by host
pub struct RobotsCache {
    fetcher: Arc<dyn RobotsFetcher>,
    user_agent: String,
    slots: DashMap<String, Arc<RobotsSlot>>,
    ttl: Duration,
    unreachable_ttl: Duration,
    on_unreachable: UnreachablePolicy,
}

impl RobotsCache {
    /// `user_agent` is the crawler's product token, used by `crawl_delay`
    pub fn new(config: &RobotsConfig, user_agent: &str, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        Self {
            fetcher,
            user_agent: user_agent.to_string(),
            slots: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            unreachable_ttl: Duration::from_secs(config.unreachable_ttl_secs),
            on_unreachable: config.on_unreachable,
        }
    }

    /// Returns the rules governing `url`, fetching them if missing or stale
    ///
    /// # Returns
    ///
    /// The rules plus whether this call fetched them. A fetch uses the host's
    /// politeness slot, so callers defer the URL that triggered it.
    pub async fn lookup(&self, url: &NormalizedUrl) -> RobotsLookup {
        let host = url.host_key();
        let slot = self.slots.entry(host.clone()).or_default().clone();

        if let Some(rules) = slot.fresh() {
            return RobotsLookup {
                rules,
                fetched: false,
            };
        }

        let _flight = slot.fetch_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(rules) = slot.fresh() {
            return RobotsLookup {
                rules,
                fetched: false,
            };
        }

        let robots_url = url.robots_url();
        debug!("Fetching {}", robots_url);
        let response = self.fetcher.fetch(&robots_url).await;
        let rules = Arc::new(self.rules_from(&host, response));
        slot.replace(rules.clone());

        RobotsLookup {
            rules,
            fetched: true,
        }
    }

    /// Checks whether `url` may be fetched by `user_agent`
    pub async fn is_allowed(&self, url: &NormalizedUrl, user_agent: &str) -> bool {
        self.lookup(url)
            .await
            .rules
            .is_allowed(&url.robots_path(), user_agent)
    }

    /// Crawl-delay from the cached rules of `host`, without fetching
    pub fn crawl_delay(&self, host: &str) -> Option<Duration> {
        self.slots
            .get(host)
            .and_then(|slot| slot.any())
            .and_then(|rules| rules.crawl_delay(&self.user_agent))
    }

    /// Number of hosts with a slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn rules_from(&self, host: &str, response: RobotsResponse) -> RobotsRules {
        let now = Utc::now();
        match response {
            RobotsResponse::Found(body) => RobotsRules::parse(&body, now, self.ttl),
            RobotsResponse::Missing => RobotsRules::allow_all(RobotsSource::Missing, now, self.ttl),
            RobotsResponse::Unreachable(reason) => {
                warn!(
                    "robots.txt for {} unreachable ({}), applying {:?} policy",
                    host, reason, self.on_unreachable
                );
                match self.on_unreachable {
                    UnreachablePolicy::Allow => {
                        RobotsRules::allow_all(RobotsSource::Unreachable, now, self.unreachable_ttl)
                    }
                    UnreachablePolicy::Deny => {
                        RobotsRules::deny_all(RobotsSource::Unreachable, now, self.unreachable_ttl)
                    }
                }
            }
        }
    }
}
