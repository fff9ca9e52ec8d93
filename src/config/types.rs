use serde::Deserialize;

/// Main configuration structure for Ripple-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub shard: Option<ShardConfig>,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent fetch workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum simultaneous in-flight fetches for one host
    #[serde(default = "default_max_concurrent_per_host")]
    pub max_concurrent_per_host: u32,

    /// Minimum time between fetch starts on one host (milliseconds)
    #[serde(default = "default_crawl_delay_ms")]
    pub default_crawl_delay_ms: u64,

    /// Upper bound applied to robots.txt Crawl-delay values (milliseconds)
    #[serde(default = "default_max_crawl_delay_ms")]
    pub max_crawl_delay_ms: u64,

    /// Fetch attempts per URL before it is dropped as a terminal failure
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Base of the exponential retry back-off (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Deadline for one page fetch, including the body (milliseconds)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Longest chain of redirect hops followed from one discovered URL
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Bodies longer than this are truncated
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Maximum link hops from a seed
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Host back-off after an HTTP 429 without Retry-After (milliseconds)
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Sleep when no host is eligible and no better hint exists (milliseconds)
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Maximum number of host states kept before idle hosts are evicted
    #[serde(default = "default_max_tracked_hosts")]
    pub max_tracked_hosts: usize,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    pub crawler_name: String,

    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// What to assume when robots.txt cannot be retrieved (timeout, 5xx, network)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnreachablePolicy {
    /// Crawl the host as if it had no robots.txt
    Allow,
    /// Treat every path on the host as disallowed until the next refresh
    Deny,
}

/// robots.txt handling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RobotsConfig {
    #[serde(default = "default_robots_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Lifetime of a successfully fetched (or 4xx) robots.txt
    #[serde(default = "default_robots_ttl_secs")]
    pub ttl_secs: u64,

    /// Lifetime of the decision taken for an unreachable robots.txt
    #[serde(default = "default_robots_unreachable_ttl_secs")]
    pub unreachable_ttl_secs: u64,

    #[serde(default = "default_unreachable_policy")]
    pub on_unreachable: UnreachablePolicy,

    #[serde(default = "default_robots_max_bytes")]
    pub max_bytes: usize,
}

/// Seen-URL filter sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DedupConfig {
    /// Number of URLs the Bloom layer is sized for
    #[serde(default = "default_expected_urls")]
    pub expected_urls: usize,

    /// Target Bloom false-positive rate
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,
}

/// A host importance weight
#[derive(Debug, Clone, Deserialize)]
pub struct HostWeight {
    /// Host pattern (e.g., "example.com", "*.example.com" or "*")
    pub pattern: String,
    pub weight: f32,
}

/// Priority scoring weights
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PriorityConfig {
    /// Score subtracted per link hop from a seed
    #[serde(default = "default_depth_weight")]
    pub depth_weight: f32,

    /// Score subtracted per URL path segment
    #[serde(default = "default_path_weight")]
    pub path_weight: f32,

    /// Scores at or above this land in the high tier
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,

    /// Scores below this land in the low tier
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f32,

    #[serde(default)]
    pub hosts: Vec<HostWeight>,
}

/// Where the exact seen-set and fetched documents live
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database; in-memory stores are used when unset
    #[serde(default)]
    pub database_path: Option<String>,
}

/// Distributed deployment settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShardConfig {
    /// Identifier of this shard; must appear in `peers`
    pub shard_id: String,

    /// All shard identifiers, this one included
    pub peers: Vec<String>,

    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: usize,
}

/// Seed URL with an optional priority tier
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,
    #[serde(default)]
    pub priority: Option<crate::crawler::Priority>,
}

fn default_workers() -> usize {
    8
}
fn default_max_concurrent_per_host() -> u32 {
    1
}
fn default_crawl_delay_ms() -> u64 {
    1000
}
fn default_max_crawl_delay_ms() -> u64 {
    30_000
}
fn default_retry_ceiling() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    2000
}
fn default_fetch_timeout_ms() -> u64 {
    30_000
}
fn default_max_redirects() -> u32 {
    10
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_max_depth() -> u32 {
    5
}
fn default_rate_limit_backoff_ms() -> u64 {
    60_000
}
fn default_idle_backoff_ms() -> u64 {
    200
}
fn default_max_tracked_hosts() -> usize {
    100_000
}
fn default_robots_timeout_ms() -> u64 {
    5000
}
fn default_robots_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_robots_unreachable_ttl_secs() -> u64 {
    60 * 60
}
fn default_unreachable_policy() -> UnreachablePolicy {
    UnreachablePolicy::Allow
}
fn default_robots_max_bytes() -> usize {
    512 * 1024
}
fn default_expected_urls() -> usize {
    10_000_000
}
fn default_false_positive_rate() -> f64 {
    0.01
}
fn default_depth_weight() -> f32 {
    0.1
}
fn default_path_weight() -> f32 {
    0.02
}
fn default_high_threshold() -> f32 {
    0.9
}
fn default_low_threshold() -> f32 {
    0.6
}
fn default_virtual_nodes() -> usize {
    150
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_concurrent_per_host: default_max_concurrent_per_host(),
            default_crawl_delay_ms: default_crawl_delay_ms(),
            max_crawl_delay_ms: default_max_crawl_delay_ms(),
            retry_ceiling: default_retry_ceiling(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            max_depth: default_max_depth(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            max_tracked_hosts: default_max_tracked_hosts(),
        }
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_robots_timeout_ms(),
            ttl_secs: default_robots_ttl_secs(),
            unreachable_ttl_secs: default_robots_unreachable_ttl_secs(),
            on_unreachable: default_unreachable_policy(),
            max_bytes: default_robots_max_bytes(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            expected_urls: default_expected_urls(),
            false_positive_rate: default_false_positive_rate(),
        }
    }
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            depth_weight: default_depth_weight(),
            path_weight: default_path_weight(),
            high_threshold: default_high_threshold(),
            low_threshold: default_low_threshold(),
            hosts: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
        }
    }
}
