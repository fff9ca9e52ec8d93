//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from `<a>`, `<area>` and canonical links)
//! - Page title
//!
//! Parsing is best-effort: malformed markup yields whatever links the HTML
//! parser recovers. Only byte streams that are not text at all fail.

use crate::url::{normalize, NormalizedUrl};
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Share of replacement characters above which a body is treated as binary
const MAX_INVALID_UTF8_RATIO: f64 = 0.1;

/// The body could not be read as text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("body contains NUL bytes")]
    Binary,

    #[error("body is not valid text ({invalid} of {total} characters undecodable)")]
    Undecodable { invalid: usize, total: usize },
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from `<title>`)
    pub title: Option<String>,

    /// Normalized links in document order, without duplicates
    pub links: Vec<NormalizedUrl>,
}

/// Extracts the followable links from a response body
///
/// Relative links resolve against `<base href>` when the page declares one,
/// otherwise against `base`.
pub fn extract(body: &[u8], base: &Url) -> Result<Vec<NormalizedUrl>, ParseError> {
    parse_page(body, base).map(|page| page.links)
}

/// Decodes a response body and parses it
///
/// # Arguments
///
/// * `body` - Raw response bytes, possibly truncated
/// * `base` - The URL the body was served from
///
/// # Returns
///
/// * `Ok(ParsedPage)` - Title and links
/// * `Err(ParseError)` - If the bytes are not text
pub fn parse_page(body: &[u8], base: &Url) -> Result<ParsedPage, ParseError> {
    let html = decode(body)?;
    Ok(parse_html(&html, base))
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` and `<area href="...">`
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
/// - Anything that does not normalize to an HTTP(S) URL
///
/// `rel="nofollow"` links are followed.
pub fn parse_html(html: &str, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, base);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, &base),
    }
}

/// Decodes a body as UTF-8, rejecting binary data
fn decode(body: &[u8]) -> Result<String, ParseError> {
    if body.contains(&0) {
        return Err(ParseError::Binary);
    }

    let text = String::from_utf8_lossy(body);
    let total = text.chars().count();
    let invalid = text.chars().filter(|c| *c == char::REPLACEMENT_CHARACTER).count();
    if total > 0 && invalid as f64 / total as f64 > MAX_INVALID_UTF8_RATIO {
        return Err(ParseError::Undecodable { invalid, total });
    }

    Ok(text.into_owned())
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The first `<base href>` resolved against the response URL
fn document_base(document: &Html, fallback: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| fallback.join(href.trim()).ok())
        })
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or_else(|| fallback.clone())
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base: &Url) -> Vec<NormalizedUrl> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        if let Some(url) = resolve_link(href, base) {
            if seen.insert(url.as_str().to_string()) {
                links.push(url);
            }
        }
    };

    if let Ok(anchor_selector) = Selector::parse("a[href], area[href]") {
        for element in document.select(&anchor_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves and normalizes one href
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base: &Url) -> Option<NormalizedUrl> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    normalize(href, Some(base)).ok()
}
