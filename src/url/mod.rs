//! URL handling module for Ripple-Crawl
//!
//! This module provides URL normalization, host extraction, wildcard host
//! matching, and the `NormalizedUrl` key type used everywhere downstream.

mod domain;
mod matcher;
mod normalize;

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::config::HostWeight;
use crate::UrlError;

// Re-export main functions
pub use domain::{extract_domain, host_key};
pub use matcher::matches_wildcard;
pub use normalize::{normalize, normalize_url};

/// A canonical, comparable URL
///
/// Produced only by [`normalize`]; two URLs that are equivalent for crawling
/// purposes always yield equal `NormalizedUrl`s. Equality, ordering and hashing
/// go through the serialized string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedUrl {
    url: Url,
}

impl NormalizedUrl {
    /// Wraps an already-normalized `Url`
    pub(crate) fn from_normalized(url: Url) -> Self {
        Self { url }
    }

    /// The canonical string form (the dedup key)
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The underlying parsed URL, for joining relative references
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Lower-cased host without port
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Host plus any non-default port
    ///
    /// This is the key for politeness state, robots.txt caching and shard
    /// ownership: two origins on one IP but different ports are separate sites.
    pub fn host_key(&self) -> String {
        host_key(&self.url).unwrap_or_default()
    }

    /// Path without query
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Path plus query, as matched against robots.txt rules
    pub fn robots_path(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Location of the robots.txt governing this URL
    pub fn robots_url(&self) -> String {
        format!("{}://{}/robots.txt", self.url.scheme(), self.host_key())
    }

    /// Number of non-empty path segments (`/` is 0, `/a/b` is 2)
    pub fn path_depth(&self) -> usize {
        self.url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).count())
            .unwrap_or(0)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl fmt::Debug for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NormalizedUrl({})", self.url.as_str())
    }
}

impl TryFrom<String> for NormalizedUrl {
    type Error = UrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize_url(&value)
    }
}

impl From<NormalizedUrl> for String {
    fn from(value: NormalizedUrl) -> Self {
        value.url.into()
    }
}

/// Looks up the importance weight configured for a host
///
/// Patterns are checked in configuration order and the first match wins, so
/// list specific hosts before broad wildcards. Unlisted hosts weigh 0.
///
/// # Examples
///
/// ```
/// use ripple_crawl::config::HostWeight;
/// use ripple_crawl::url::host_weight;
///
/// let weights = vec![HostWeight { pattern: "*.example.com".to_string(), weight: 0.5 }];
/// assert_eq!(host_weight("blog.example.com", &weights), 0.5);
/// assert_eq!(host_weight("other.org", &weights), 0.0);
/// ```
pub fn host_weight(host: &str, weights: &[HostWeight]) -> f32 {
    weights
        .iter()
        .find(|entry| matches_wildcard(&entry.pattern, host))
        .map(|entry| entry.weight)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> Vec<HostWeight> {
        vec![
            HostWeight {
                pattern: "news.example.com".to_string(),
                weight: 1.0,
            },
            HostWeight {
                pattern: "*.example.com".to_string(),
                weight: 0.25,
            },
        ]
    }

    #[test]
    fn test_host_key_keeps_explicit_port() {
        let url = normalize_url("http://127.0.0.1:8080/a").unwrap();
        assert_eq!(url.host(), "127.0.0.1");
        assert_eq!(url.host_key(), "127.0.0.1:8080");
    }

    #[test]
    fn test_host_key_drops_default_port() {
        let url = normalize_url("https://Example.com:443/a").unwrap();
        assert_eq!(url.host_key(), "example.com");
    }

    #[test]
    fn test_robots_url_and_path() {
        let url = normalize_url("http://a.test:81/private/page?b=2&a=1").unwrap();
        assert_eq!(url.robots_url(), "http://a.test:81/robots.txt");
        assert_eq!(url.robots_path(), "/private/page?a=1&b=2");
    }

    #[test]
    fn test_path_depth() {
        assert_eq!(normalize_url("https://a.test/").unwrap().path_depth(), 0);
        assert_eq!(normalize_url("https://a.test/x/y").unwrap().path_depth(), 2);
    }

    #[test]
    fn test_serde_as_string() {
        let url = normalize_url("https://a.test/x#frag").unwrap();
        let back = NormalizedUrl::try_from(String::from(url.clone())).unwrap();
        assert_eq!(url, back);
        assert_eq!(back.as_str(), "https://a.test/x");
    }

    #[test]
    fn test_host_weight_first_match_wins() {
        let weights = weights();
        assert_eq!(host_weight("news.example.com", &weights), 1.0);
        assert_eq!(host_weight("blog.example.com", &weights), 0.25);
        assert_eq!(host_weight("example.com", &weights), 0.25);
        assert_eq!(host_weight("example.org", &weights), 0.0);
    }
}
