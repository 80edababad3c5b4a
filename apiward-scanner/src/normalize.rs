use url::Url;

/// Canonical key for de-duplicating pages: `scheme://host[:port]/path`,
/// trailing slashes stripped, query and fragment dropped.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut key = format!("{}://", parsed.scheme());
            if let Some(host) = parsed.host_str() {
                key.push_str(host);
            }
            if let Some(port) = parsed.port() {
                key.push_str(&format!(":{}", port));
            }
            key.push_str(parsed.path().trim_end_matches('/'));
            key
        }
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

/// True when the last path segment carries no file extension.
///
/// Used to keep the crawl on "page-like" URLs and away from assets.
pub fn has_no_extension(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let path = path.strip_suffix('/').unwrap_or(path.as_str());
    let segment = path.rsplit('/').next().unwrap_or("");

    // ".hidden" style names have no extension
    !matches!(segment.rfind('.'), Some(idx) if idx > 0)
}
