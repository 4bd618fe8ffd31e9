use crate::url::extract_domain;
use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// File extensions treated as static assets and excluded from the frontier
const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "tiff", "mp3",
    "mp4", "wav", "ogg", "webm", "avi", "mov", "flac", "zip", "tar", "gz", "rar", "7z", "woff",
    "woff2", "ttf", "eot", "pdf",
];

/// Links longer than this are dropped rather than queued
pub const MAX_URL_LENGTH: usize = 200;

/// Returns true if the URL's path extension marks it as a non-HTML static asset
pub fn is_static_asset(url: &Url) -> bool {
    let path = url.path();
    match path.rsplit_once('.') {
        Some((_, ext)) => STATIC_ASSET_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Normalizes a URL into a canonical form so equivalent links dedupe and so
/// every link that reaches the Frontier is one the fetcher's HTTPS-only
/// client can actually request.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject schemes other than http/https, then upgrade http to https
/// 3. Lowercase the host/domain via [`extract_domain`]
/// 4. Remove www. prefix from domain
/// 5. Normalize path:
///    - Remove dot segments (. and ..)
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 6. Remove fragment (everything after #)
/// 7. Remove tracking query parameters
/// 8. Sort remaining query parameters alphabetically
/// 9. Remove empty query string (trailing ?)
///
/// # Examples
///
/// ```
/// use tidecrawl::url::normalize_url;
///
/// let url = normalize_url("http://WWW.EXAMPLE.COM/page/").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }
    if url.scheme() == "http" {
        // The fetcher's client only speaks HTTPS; upgrading here means a
        // discovered `http://` link gets one real attempt instead of being
        // silently rejected the moment it reaches the network layer.
        url.set_scheme("https")
            .map_err(|_| UrlError::Malformed("failed to upgrade scheme to https".to_string()))?;
    }

    let host = extract_domain(&url).ok_or(UrlError::MissingDomain)?;
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);
        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = filtered_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    // Split path into segments and normalize
    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in segments {
        match segment {
            // Skip empty segments (from multiple slashes) and current directory markers
            "" | "." => continue,
            // Parent directory - pop the last segment if possible
            ".." => {
                if !normalized_segments.is_empty() {
                    normalized_segments.pop();
                }
            }
            // Regular segment
            _ => normalized_segments.push(segment),
        }
    }

    // Reconstruct path
    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    let result = format!("/{}", normalized_segments.join("/"));

    // Remove trailing slash unless it's the root
    if result.len() > 1 && result.ends_with('/') {
        result[..result.len() - 1].to_string()
    } else {
        result
    }
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Sort by key
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    // Check exact matches
    if TRACKING_PARAMS.contains(&key) {
        return true;
    }

    // Check for utm_* prefix (catches any utm parameter)
    if key.starts_with("utm_") {
        return true;
    }

    false
}
