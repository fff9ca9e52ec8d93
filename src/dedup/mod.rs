//! Seen-URL filter
//!
//! A Bloom filter answers "definitely new" cheaply; only a "maybe seen"
//! answer reaches the exact [`SeenStore`], which is the source of truth.
//! `check_and_mark` runs under a per-key stripe lock so two workers that
//! discover the same link at once cannot both be told it is new.

mod bloom;
mod fingerprint;

pub use bloom::BloomFilter;
pub use fingerprint::Fingerprint;

use crate::config::DedupConfig;
use crate::storage::SeenStore;
use crate::url::NormalizedUrl;
use crate::CrawlError;
use std::sync::{Arc, Mutex};
use tracing::debug;

const STRIPES: usize = 64;

/// Two-tier seen-URL set
pub struct SeenFilter {
    bloom: BloomFilter,
    store: Arc<dyn SeenStore>,
    stripes: Box<[Mutex<()>]>,
}

impl SeenFilter {
    pub fn new(config: &DedupConfig, store: Arc<dyn SeenStore>) -> Self {
        Self {
            bloom: BloomFilter::new(config.expected_urls, config.false_positive_rate),
            store,
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Returns true if `url` has been marked seen
    pub fn is_seen(&self, url: &NormalizedUrl) -> Result<bool, CrawlError> {
        let fingerprint = Fingerprint::of(url.as_str());
        if !self.bloom.might_contain(fingerprint) {
            return Ok(false);
        }
        self.store
            .contains(url.as_str())
            .map_err(CrawlError::SeenStoreUnavailable)
    }

    /// Records `url` as seen
    pub fn mark_seen(&self, url: &NormalizedUrl) -> Result<(), CrawlError> {
        self.check_and_mark(url).map(|_| ())
    }

    /// Marks `url` seen and reports whether this call was the one that did it
    ///
    /// Exactly one of any number of concurrent callers for the same key gets
    /// `true`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - `url` was new and is now marked
    /// * `Ok(false)` - `url` had already been marked
    /// * `Err(_)` - The backing store failed; the crawl cannot continue safely
    pub fn check_and_mark(&self, url: &NormalizedUrl) -> Result<bool, CrawlError> {
        let key = url.as_str();
        let fingerprint = Fingerprint::of(key);
        let _guard = self.stripes[fingerprint.stripe(STRIPES)]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let newly_marked = if self.bloom.might_contain(fingerprint) {
            // Possible false positive: the store decides
            let present = self
                .store
                .contains(key)
                .map_err(CrawlError::SeenStoreUnavailable)?;
            if present {
                false
            } else {
                debug!("Bloom false positive for {}", key);
                self.insert_exact(key)?
            }
        } else {
            // The store may still know the key from an earlier run
            self.insert_exact(key)?
        };

        self.bloom.insert(fingerprint);
        Ok(newly_marked)
    }

    fn insert_exact(&self, key: &str) -> Result<bool, CrawlError> {
        self.store
            .insert(key)
            .map_err(CrawlError::SeenStoreUnavailable)
    }

    /// The probabilistic first layer
    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }
}
