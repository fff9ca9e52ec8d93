use crate::url::NormalizedUrl;
use crate::UrlError;
use url::Url;

/// Tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "mc_cid", "mc_eid", "_ga",
];

/// Normalizes a raw URL into its canonical crawl key
///
/// # Normalization Steps
///
/// 1. Resolve `raw` against `base` when given; reject if malformed
/// 2. Reject any scheme other than `http` / `https`
/// 3. Lowercase the host and drop a trailing root dot
/// 4. Drop the scheme's default port
/// 5. Resolve dot segments and strip a single trailing slash (root stays `/`)
/// 6. Remove the fragment
/// 7. Remove tracking parameters, sort the rest by key then value, and
///    re-encode them canonically; an empty query is removed entirely
///
/// The function is pure: identical inputs always produce identical keys.
///
/// # Arguments
///
/// * `raw` - The URL as found, absolute or relative
/// * `base` - The page `raw` was found on, for resolving relative references
///
/// # Returns
///
/// The canonical URL, or a [`UrlError`] for unparseable input and
/// unsupported schemes
///
/// # Examples
///
/// ```
/// use ripple_crawl::url::normalize;
/// use url::Url;
///
/// let base = Url::parse("http://a.test/dir/page").unwrap();
/// let url = normalize("../x/?b=2&a=1#top", Some(&base)).unwrap();
/// assert_eq!(url.as_str(), "http://a.test/x?a=1&b=2");
/// ```
pub fn normalize(raw: &str, base: Option<&Url>) -> Result<NormalizedUrl, UrlError> {
    let raw = raw.trim();

    // Step 1: Parse, resolving relative references
    let mut url = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    }
    .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    // Step 2: Scheme
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    // Step 3: Host
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingHost)?
        .to_lowercase();
    let trimmed = host.strip_suffix('.').unwrap_or(&host);
    if trimmed != url.host_str().unwrap_or_default() {
        let trimmed = trimmed.to_string();
        url.set_host(Some(&trimmed))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    }

    // Step 4 needs no code: `Url` never stores the scheme's default port

    // Step 5: Path
    let path = strip_trailing_slash(url.path()).to_string();
    url.set_path(&path);

    // Step 6: Fragment
    url.set_fragment(None);

    // Step 7: Query
    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(NormalizedUrl::from_normalized(url))
}

/// Normalizes an absolute URL (no base to resolve against)
///
/// # Examples
///
/// ```
/// use ripple_crawl::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/page/#section").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(raw: &str) -> Result<NormalizedUrl, UrlError> {
    normalize(raw, None)
}

/// Removes one trailing slash unless the path is the root
fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        "/"
    }
}

/// Drops tracking parameters and sorts what remains by key, then value
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.is_empty() && !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}
