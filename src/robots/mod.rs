//! Robots.txt handling module
//!
//! This module provides fetching, parsing, and caching of robots.txt files.
//! Rules are immutable values; the cache swaps them whole on refresh.

mod cache;
mod fetcher;
mod parser;

pub use cache::{RobotsCache, RobotsLookup};
pub use fetcher::{HttpRobotsFetcher, RobotsFetcher, RobotsResponse};
pub use parser::{RobotsGroup, RobotsRules, RobotsSource};
