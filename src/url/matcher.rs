/// Checks if a host matches a configured host pattern
///
/// Supported patterns:
/// - `"*"` matches every host
/// - `"example.com"` matches only that host
/// - `"*.example.com"` matches `example.com` and any subdomain of it
///
/// Comparison ignores ASCII case, since patterns come from hand-written
/// configuration while hosts are already lower-cased by normalization.
///
/// # Examples
///
/// ```
/// use ripple_crawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.Example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// assert!(matches_wildcard("*", "anything.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    match pattern.strip_prefix("*.") {
        Some(base) => {
            if candidate.eq_ignore_ascii_case(base) {
                return true;
            }
            // Needs room for at least one label plus the dot
            if candidate.len() <= base.len() + 1 {
                return false;
            }
            let split = candidate.len() - base.len();
            candidate.is_char_boundary(split)
                && candidate[split..].eq_ignore_ascii_case(base)
                && candidate.as_bytes()[split - 1] == b'.'
        }
        None => candidate.eq_ignore_ascii_case(pattern),
    }
}
