//! Priority tiers and link scoring

use crate::config::PriorityConfig;
use crate::url::{host_weight, NormalizedUrl};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frontier priority tier, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Position of the tier in dequeue order
    pub fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        })
    }
}

/// Score every fresh link starts from before penalties and host weight
const BASE_SCORE: f32 = 1.0;

/// Scores discovered links from hop depth, path depth and host importance
///
/// `score = 1.0 - depth_weight * hops - path_weight * path_segments + host_weight`
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    config: PriorityConfig,
}

impl PriorityScorer {
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    /// Scores `url` discovered at hop `depth`
    ///
    /// # Arguments
    ///
    /// * `url` - The normalized link
    /// * `depth` - Hops from the nearest seed
    ///
    /// # Returns
    ///
    /// The raw score; higher is more urgent
    pub fn score(&self, url: &NormalizedUrl, depth: u32) -> f32 {
        BASE_SCORE - self.config.depth_weight * depth as f32
            - self.config.path_weight * url.path_depth() as f32
            + host_weight(url.host(), &self.config.hosts)
    }

    /// Maps a score onto a tier using the configured thresholds
    pub fn tier(&self, score: f32) -> Priority {
        if score >= self.config.high_threshold {
            Priority::High
        } else if score < self.config.low_threshold {
            Priority::Low
        } else {
            Priority::Medium
        }
    }

    /// Score and tier in one call
    pub fn assign(&self, url: &NormalizedUrl, depth: u32) -> (Priority, f32) {
        let score = self.score(url, depth);
        (self.tier(score), score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostWeight;
    use crate::url::normalize_url;

    fn scorer() -> PriorityScorer {
        PriorityScorer::new(PriorityConfig {
            depth_weight: 0.1,
            path_weight: 0.05,
            high_threshold: 0.9,
            low_threshold: 0.6,
            hosts: vec![
                HostWeight {
                    pattern: "*.important.test".to_string(),
                    weight: 0.5,
                },
                HostWeight {
                    pattern: "spam.test".to_string(),
                    weight: -1.0,
                },
            ],
        })
    }

    #[test]
    fn test_shallow_link_is_high() {
        let url = normalize_url("http://a.test/").unwrap();
        assert_eq!(scorer().assign(&url, 0).0, Priority::High);
    }

    #[test]
    fn test_depth_lowers_tier() {
        let scorer = scorer();
        let url = normalize_url("http://a.test/x").unwrap();
        assert_eq!(scorer.assign(&url, 1).0, Priority::Medium);
        assert_eq!(scorer.assign(&url, 5).0, Priority::Low);
        assert!(scorer.score(&url, 1) > scorer.score(&url, 2));
    }

    #[test]
    fn test_path_depth_penalty() {
        let scorer = scorer();
        let shallow = normalize_url("http://a.test/a").unwrap();
        let deep = normalize_url("http://a.test/a/b/c/d").unwrap();
        assert!(scorer.score(&shallow, 1) > scorer.score(&deep, 1));
    }

    #[test]
    fn test_host_weight() {
        let scorer = scorer();
        let boosted = normalize_url("http://www.important.test/a/b").unwrap();
        let sunk = normalize_url("http://spam.test/").unwrap();
        assert_eq!(scorer.assign(&boosted, 3).0, Priority::High);
        assert_eq!(scorer.assign(&sunk, 0).0, Priority::Low);
    }

    #[test]
    fn test_tier_order() {
        assert!(Priority::High < Priority::Medium);
        assert_eq!(
            [Priority::High, Priority::Medium, Priority::Low].map(Priority::index),
            [0, 1, 2]
        );
        assert_eq!(Priority::Low.to_string(), "low");
    }
}
