//! URL helpers shared by the form, batch runner and handlers

use url::Url;

/// Trim surrounding whitespace from a URL
pub fn normalize_url(url: &str) -> String {
    url.trim().to_string()
}

/// Lowercased host of `url`, or `None` when it does not parse
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
}

/// Check that `url` is an absolute http(s) URL
pub fn is_http_url(url: &str) -> bool {
    Url::parse(url.trim())
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
        .unwrap_or(false)
}

/// Split a comma separated list of URLs, dropping empty entries
pub fn split_url_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(normalize_url)
        .filter(|url| !url.is_empty())
        .collect()
}

/// URL without its query string and fragment
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}
