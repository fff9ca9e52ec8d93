//! Frontier entry lifecycle
//!
//! `Queued -> InFlight -> {Done | Requeued | Dropped}`; a requeued entry is
//! queued again with its attempt count incremented.

use std::fmt;

/// Where an entry is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Waiting in the frontier
    Queued,

    /// Leased to a worker
    InFlight,

    /// Fetched successfully
    Done,

    /// Failed retryably and went back into the frontier
    Requeued,

    /// Discarded for good
    Dropped(DropReason),
}

impl EntryState {
    /// Returns true if the entry has left the frontier for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Dropped(_))
    }
}

/// Why an entry was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// robots.txt refused the URL
    RobotsDisallowed,

    /// The retry ceiling was reached
    RetriesExhausted,

    /// A 4xx response other than 429
    HttpError(u16),

    /// The response was not HTML
    UnsupportedContent,

    TooManyRedirects,
}

impl DropReason {
    /// Policy refusals are counted apart from errors
    pub fn is_policy(&self) -> bool {
        matches!(self, Self::RobotsDisallowed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots_disallowed",
            Self::RetriesExhausted => "retries_exhausted",
            Self::HttpError(_) => "http_error",
            Self::UnsupportedContent => "unsupported_content",
            Self::TooManyRedirects => "too_many_redirects",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError(status) => write!(f, "http_error({})", status),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(EntryState::Done.is_terminal());
        assert!(EntryState::Dropped(DropReason::RetriesExhausted).is_terminal());
        assert!(!EntryState::Queued.is_terminal());
        assert!(!EntryState::InFlight.is_terminal());
        assert!(!EntryState::Requeued.is_terminal());
    }

    #[test]
    fn test_policy_reason() {
        assert!(DropReason::RobotsDisallowed.is_policy());
        assert!(!DropReason::HttpError(404).is_policy());
    }

    #[test]
    fn test_display() {
        assert_eq!(DropReason::HttpError(404).to_string(), "http_error(404)");
        assert_eq!(DropReason::RobotsDisallowed.to_string(), "robots_disallowed");
    }
}
