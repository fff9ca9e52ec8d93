use url::Url;

/// Extracts the lower-cased host from a URL
///
/// Returns None for URLs without a host (which never happens for
/// normalized HTTP(S) URLs).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_crawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the politeness key of a URL: host plus any non-default port
///
/// `Url::port()` is already `None` for the scheme's default port, so
/// `https://a.test:443/` and `https://a.test/` share a key.
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
