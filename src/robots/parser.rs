//! robots.txt parsing and matching
//!
//! Allow/Disallow matching is delegated to the robotstxt crate, which follows
//! Google's reference matcher (wildcards, `$` anchors, longest match, percent
//! encoding). Crawl-delay is not part of that standard and is parsed here.
//!
//! Rules are never patched after construction; a refresh builds a new
//! [`RobotsRules`] and swaps it in whole.

use chrono::{DateTime, Utc};
use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Largest Crawl-delay taken from a robots.txt; longer values are clamped
const MAX_ROBOTS_CRAWL_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Body used for rule sets that refuse everything
const DENY_ALL_BODY: &str = "User-agent: *\nDisallow: /\n";

/// Where a rule set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsSource {
    /// A robots.txt body was fetched and parsed
    Fetched,
    /// The server answered 4xx: no restrictions
    Missing,
    /// Timeout, 5xx or network failure; rules reflect the configured policy
    Unreachable,
}

/// A `User-agent` block and the Crawl-delay declared under it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsGroup {
    /// Lower-cased agent tokens (`*` for the wildcard group)
    pub agents: Vec<String>,
    pub crawl_delay: Option<Duration>,
}

/// Parsed robots.txt for one host
#[derive(Debug, Clone)]
pub struct RobotsRules {
    /// Raw body handed to the matcher; empty means allow everything
    body: String,
    groups: Vec<RobotsGroup>,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
    source: RobotsSource,
}

impl RobotsRules {
    /// Parses a robots.txt body
    ///
    /// # Arguments
    ///
    /// * `body` - The robots.txt content as served
    /// * `fetched_at` - When the body was fetched
    /// * `ttl` - How long the rules stay fresh
    ///
    /// # Returns
    ///
    /// Rules with `RobotsSource::Fetched`. Malformed lines are ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use ripple_crawl::RobotsRules;
    /// use std::time::Duration;
    ///
    /// let rules = RobotsRules::parse(
    ///     "User-agent: *\nDisallow: /private\nAllow: /private/open\n",
    ///     Utc::now(),
    ///     Duration::from_secs(3600),
    /// );
    /// assert!(!rules.is_allowed("/private/page", "RippleBot"));
    /// assert!(rules.is_allowed("/private/open/page", "RippleBot"));
    /// assert!(rules.is_allowed("/public", "RippleBot"));
    /// ```
    pub fn parse(body: &str, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            body: body.to_string(),
            groups: parse_groups(body),
            fetched_at,
            ttl,
            source: RobotsSource::Fetched,
        }
    }

    /// Rules that allow everything
    pub fn allow_all(source: RobotsSource, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            body: String::new(),
            groups: Vec::new(),
            fetched_at,
            ttl,
            source,
        }
    }

    /// Rules that disallow everything except `/robots.txt`
    pub fn deny_all(source: RobotsSource, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            body: DENY_ALL_BODY.to_string(),
            groups: parse_groups(DENY_ALL_BODY),
            fetched_at,
            ttl,
            source,
        }
    }

    pub fn groups(&self) -> &[RobotsGroup] {
        &self.groups
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn source(&self) -> RobotsSource {
        self.source
    }

    /// True once `ttl` has passed since `fetched_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(age) => age >= self.ttl,
            // fetched_at lies in the future (clock step); keep the rules
            Err(_) => false,
        }
    }

    /// Checks if a path may be fetched by the given user agent
    ///
    /// # Arguments
    ///
    /// * `path` - Path plus query of the URL (e.g. `/page?id=1`)
    /// * `user_agent` - The full User-Agent header; only its product token is matched
    ///
    /// # Returns
    ///
    /// * `true` - If the path is allowed (always for `/robots.txt`)
    /// * `false` - If a Disallow rule wins for this agent
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        if path == "/robots.txt" || self.body.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, &product_token(user_agent), path)
    }

    /// Crawl-delay declared for `user_agent`, if any
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.matching_groups(user_agent)
            .filter_map(|group| group.crawl_delay)
            .max()
    }

    /// Groups that apply to `user_agent`
    ///
    /// The groups naming the most specific (longest) agent token that the
    /// crawler's product token starts with are used; otherwise the `*` groups.
    fn matching_groups<'a>(&'a self, user_agent: &str) -> impl Iterator<Item = &'a RobotsGroup> + 'a {
        let token = product_token(user_agent);

        let best_len = self
            .groups
            .iter()
            .flat_map(|group| group.agents.iter())
            .filter(|agent| agent.as_str() != "*" && token.starts_with(agent.as_str()))
            .map(|agent| agent.len())
            .max();

        self.groups.iter().filter(move |group| {
            group.agents.iter().any(|agent| match best_len {
                Some(len) => agent.len() == len && token.starts_with(agent.as_str()),
                None => agent == "*",
            })
        })
    }
}

/// Splits a body into `User-agent` groups, keeping each group's Crawl-delay
///
/// Directives that appear before any `User-agent` line belong to no group.
fn parse_groups(body: &str) -> Vec<RobotsGroup> {
    let mut groups: Vec<RobotsGroup> = Vec::new();
    let mut current: Option<RobotsGroup> = None;
    // True once the current group has received a non-agent directive
    let mut has_directives = false;

    for line in body.lines() {
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if has_directives {
                    groups.extend(current.take());
                    has_directives = false;
                }
                current
                    .get_or_insert_with(RobotsGroup::default)
                    .agents
                    .push(value.to_ascii_lowercase());
            }
            "crawl-delay" => {
                if let Some(group) = current.as_mut() {
                    has_directives = true;
                    if let Some(delay) = parse_crawl_delay(value) {
                        group.crawl_delay = Some(delay);
                    }
                }
            }
            "allow" | "disallow" => {
                if current.is_some() {
                    has_directives = true;
                }
            }
            _ => {}
        }
    }
    groups.extend(current);
    groups
}

/// Seconds as written in the file, clamped to [`MAX_ROBOTS_CRAWL_DELAY`]
///
/// Negative and NaN values are ignored.
fn parse_crawl_delay(value: &str) -> Option<Duration> {
    let secs = value.parse::<f64>().ok()?;
    if secs.is_nan() {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(MAX_ROBOTS_CRAWL_DELAY.as_secs_f64())).ok()
}

/// Lower-cased product token: `RippleBot/1.0 (+...)` becomes `ripplebot`
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
