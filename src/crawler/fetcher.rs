//! HTTP fetcher implementation
//!
//! This module handles the page fetch for one frontier entry:
//! - Building the HTTP client with the crawler's user agent
//! - A hard deadline on every request
//! - Reporting redirects instead of following them, so every hop goes through
//!   robots.txt, politeness and dedup like any discovered link
//! - Restricting responses to HTML-like content types
//! - Reading at most `max-body-bytes` of the body
//! - Classifying failures into retry / drop decisions

use crate::config::Config;
use crate::state::DropReason;
use crate::url::NormalizedUrl;
use crate::CrawlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Content types the link extractor understands
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// What happened to one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 2xx with an HTML body
    Success { status: u16 },

    /// 3xx response; `location` is the resolved `Location` header, if usable
    Redirect { status: u16, location: Option<Url> },

    /// Non-2xx, non-3xx response
    HttpError {
        status: u16,
        /// Parsed `Retry-After`, if the server sent one in seconds
        retry_after: Option<Duration>,
    },

    /// The deadline passed before the response was complete
    Timeout,

    /// Connection refused, reset, DNS failure and the like
    NetworkError(String),

    /// The response was not HTML
    UnsupportedContent(String),
}

/// What the frontier should do with the entry after a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Done,
    Retry,
    Drop(DropReason),
}

impl FetchOutcome {
    /// Decides what happens to the entry after this outcome
    ///
    /// # Returns
    ///
    /// * `Disposition::Done` - Success, or a redirect whose target gets routed
    /// * `Disposition::Retry` - Timeouts, network errors, 429 and 5xx
    /// * `Disposition::Drop` - Every other status, unusable redirects and non-HTML bodies
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Success { .. } => Disposition::Done,
            Self::Redirect {
                location: Some(_), ..
            } => Disposition::Done,
            Self::Redirect { status, .. } => Disposition::Drop(DropReason::HttpError(*status)),
            Self::Timeout | Self::NetworkError(_) => Disposition::Retry,
            Self::HttpError { status, .. } => {
                let status = *status;
                // 429 says "not now" rather than "never": the host is backed
                // off and the URL retried, bounded by the retry ceiling
                if status == StatusCode::TOO_MANY_REQUESTS.as_u16() || status >= 500 {
                    Disposition::Retry
                } else {
                    Disposition::Drop(DropReason::HttpError(status))
                }
            }
            Self::UnsupportedContent(_) => Disposition::Drop(DropReason::UnsupportedContent),
        }
    }

    /// True for 429 Too Many Requests
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpError { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS.as_u16())
    }

    /// The error this outcome represents, for logging; `None` on success
    pub fn to_error(&self, url: &NormalizedUrl) -> Option<CrawlError> {
        let url = url.to_string();
        match self {
            Self::Success { .. } => None,
            Self::Redirect {
                location: Some(_), ..
            } => None,
            Self::Redirect { status, .. } => Some(CrawlError::FetchHttpError {
                url,
                status: *status,
            }),
            Self::Timeout => Some(CrawlError::FetchTimeout { url }),
            Self::NetworkError(message) => Some(CrawlError::FetchNetworkError {
                url,
                message: message.clone(),
            }),
            Self::HttpError { status, .. } => Some(CrawlError::FetchHttpError {
                url,
                status: *status,
            }),
            Self::UnsupportedContent(content_type) => Some(CrawlError::FetchNetworkError {
                url,
                message: format!("unsupported content type {}", content_type),
            }),
        }
    }
}

/// Result of one fetch attempt
///
/// Produced once per attempt and handed to the coordinator, which passes the
/// body to the content store and the links back to the frontier.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The URL that was requested and that the body was served from
    pub url: NormalizedUrl,

    pub outcome: FetchOutcome,

    pub headers: HeaderMap,

    /// Present only on success
    pub body: Option<Vec<u8>>,

    /// The body was cut at `max-body-bytes`
    pub truncated: bool,

    pub fetched_at: DateTime<Utc>,

    /// Filled in by the worker after link extraction
    pub links: Vec<NormalizedUrl>,
}

impl FetchResult {
    /// A failed attempt with no body
    pub fn failed(url: &NormalizedUrl, outcome: FetchOutcome) -> Self {
        Self {
            url: url.clone(),
            outcome,
            headers: HeaderMap::new(),
            body: None,
            truncated: false,
            fetched_at: Utc::now(),
            links: Vec::new(),
        }
    }

    /// A successful attempt
    pub fn success(url: &NormalizedUrl, status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            outcome: FetchOutcome::Success { status },
            headers,
            body: Some(body),
            ..Self::failed(url, FetchOutcome::Success { status })
        }
    }

    /// HTTP status, when a response arrived at all
    pub fn status(&self) -> Option<u16> {
        match self.outcome {
            FetchOutcome::Success { status }
            | FetchOutcome::Redirect { status, .. }
            | FetchOutcome::HttpError { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Redirect target, for 3xx responses with a usable `Location`
    pub fn redirect_target(&self) -> Option<&Url> {
        match &self.outcome {
            FetchOutcome::Redirect { location, .. } => location.as_ref(),
            _ => None,
        }
    }
}

/// Performs page fetches
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &NormalizedUrl) -> FetchResult;
}

/// Builds an HTTP client with proper configuration
///
/// User agent format: `CrawlerName/Version (+ContactURL; ContactEmail)`.
/// Redirects are never followed by the client; see [`FetchOutcome::Redirect`].
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// A configured reqwest Client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_millis(config.crawler.fetch_timeout_ms);

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Page fetcher over reqwest
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            max_body_bytes: config.crawler.max_body_bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &NormalizedUrl) -> FetchResult {
        let mut response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => return FetchResult::failed(url, classify_error(&e)),
        };

        let status = response.status();
        let headers = response.headers().clone();

        if status.is_redirection() {
            let location = headers
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| url.as_url().join(value.trim()).ok());
            let mut result = FetchResult::failed(
                url,
                FetchOutcome::Redirect {
                    status: status.as_u16(),
                    location,
                },
            );
            result.headers = headers;
            return result;
        }

        if !status.is_success() {
            let mut result = FetchResult::failed(
                url,
                FetchOutcome::HttpError {
                    status: status.as_u16(),
                    retry_after: parse_retry_after(&headers),
                },
            );
            result.headers = headers;
            return result;
        }

        if let Some(content_type) = unsupported_content_type(&headers) {
            let mut result = FetchResult::failed(url, FetchOutcome::UnsupportedContent(content_type));
            result.headers = headers;
            return result;
        }

        let mut body = Vec::new();
        let mut truncated = false;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() > self.max_body_bytes {
                        body.truncate(self.max_body_bytes);
                        truncated = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => return FetchResult::failed(url, classify_error(&e)),
            }
        }

        let mut result = FetchResult::success(url, status.as_u16(), headers, body);
        result.truncated = truncated;
        result
    }
}

fn classify_error(error: &reqwest::Error) -> FetchOutcome {
    if error.is_timeout() {
        FetchOutcome::Timeout
    } else {
        FetchOutcome::NetworkError(error.to_string())
    }
}

/// Returns the content type if present and not HTML-like
fn unsupported_content_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().unwrap_or("").to_string();
    let mime = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if mime.is_empty() || HTML_CONTENT_TYPES.contains(&mime.as_str()) {
        None
    } else {
        Some(value)
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
