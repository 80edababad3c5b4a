use crate::error::{FetchError, Result, ScanError};
use crate::normalize::{has_no_extension, normalize_url};
use crate::result::CrawlSummary;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Called before each fetch with the number of pages fetched so far and the URL.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

const USER_AGENT: &str = concat!("apiward/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Fixed pause between consecutive fetches.
    pub delay: Duration,
    pub max_pages: Option<usize>,
    pub max_duration: Option<Duration>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            delay: Duration::from_secs(1),
            max_pages: None,
            max_duration: None,
        }
    }
}

impl CrawlConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_pages.is_some() || self.max_duration.is_some()
    }
}

/// Work-list plus the visited/failed sets, all keyed by normalised URL.
struct Frontier {
    pending: Vec<String>,
    visited: HashSet<String>,
    failed: HashSet<String>,
}

impl Frontier {
    fn new(seed: &str) -> Self {
        Self {
            pending: vec![seed.to_string()],
            visited: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    fn pop(&mut self) -> Option<String> {
        self.pending.pop()
    }

    fn push(&mut self, url: String) {
        self.pending.push(url);
    }

    fn is_known(&self, key: &str) -> bool {
        self.visited.contains(key) || self.failed.contains(key)
    }

    fn mark_visited(&mut self, key: String) {
        self.visited.insert(key);
    }

    fn mark_failed(&mut self, key: String) {
        self.failed.insert(key);
    }
}

pub struct Crawler {
    client: Client,
    config: CrawlConfig,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new() -> Result<Self> {
        Self::with_config(CrawlConfig::default())
    }

    pub fn with_config(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Use an already configured client. Its own timeout applies to fetches.
    pub fn with_client(client: Client, config: CrawlConfig) -> Self {
        Self {
            client,
            config,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Walk every same-origin, page-like URL reachable from `base_url`.
    pub async fn crawl(&self, base_url: &str) -> Result<CrawlSummary> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "{}: only http and https are supported",
                base_url
            )));
        }

        info!("Starting crawl of {}", base_url);
        if !self.config.is_bounded() {
            warn!(
                "Crawl of {} has no page or time limit and runs until the frontier is empty",
                base_url
            );
        }

        let base_key = normalize_url(base_url);
        let started = Instant::now();
        let mut frontier = Frontier::new(base_url);
        let mut summary = CrawlSummary::default();
        let mut fetched_any = false;

        while let Some(current) = frontier.pop() {
            let key = normalize_url(&current);
            if frontier.is_known(&key) {
                continue;
            }

            if let Some(max_pages) = self.config.max_pages
                && summary.visited.len() >= max_pages
            {
                info!("Page limit of {} reached, stopping crawl", max_pages);
                summary.truncated = true;
                break;
            }
            if let Some(max_duration) = self.config.max_duration
                && started.elapsed() >= max_duration
            {
                info!("Time limit of {:?} reached, stopping crawl", max_duration);
                summary.truncated = true;
                break;
            }

            if fetched_any && !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
            fetched_any = true;

            if let Some(ref callback) = self.progress_callback {
                callback(summary.visited.len(), current.clone());
            }

            match self.fetch_page(&current).await {
                Ok(body) => {
                    frontier.mark_visited(key);
                    for link in Self::extract_links(&body, &current)? {
                        let link_key = normalize_url(&link);
                        if !frontier.is_known(&link_key)
                            && Self::is_within(&base_key, &link_key)
                            && has_no_extension(&link_key)
                        {
                            debug!("  -> queueing {}", link);
                            frontier.push(link);
                        }
                    }
                    summary.visited.push(current);
                }
                Err(e) => {
                    debug!("Fetch failed for {}: {}", current, e);
                    frontier.mark_failed(key);
                }
            }
        }

        summary.failed = frontier.failed.into_iter().collect();
        summary.failed.sort();
        summary.visited.sort();
        summary.elapsed = started.elapsed();

        info!(
            "Crawl complete. Visited {} pages, {} failed, in {:.2?}",
            summary.visited.len(),
            summary.failed.len(),
            summary.elapsed
        );
        Ok(summary)
    }

    /// Fetch one page body. Non-2xx answers are errors.
    pub async fn fetch_page(&self, url: &str) -> std::result::Result<String, FetchError> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    fn extract_links(html: &str, current_url: &str) -> Result<Vec<String>> {
        let document = Html::parse_document(html);
        let link_selector = Selector::parse("a[href]")
            .map_err(|e| ScanError::Other(format!("bad link selector: {}", e)))?;

        Ok(document
            .select(&link_selector)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| Self::resolve_url(current_url, href))
            .collect())
    }

    fn resolve_url(base: &str, href: &str) -> Option<String> {
        // Skip empty, javascript:, mailto:, tel:, etc.
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with('#')
        {
            return None;
        }

        let base_url = Url::parse(base).ok()?;
        let mut resolved = base_url.join(href).ok()?;
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        resolved.set_fragment(None);

        Some(resolved.to_string())
    }

    /// `key` is the base itself or lies underneath it.
    fn is_within(base_key: &str, key: &str) -> bool {
        key == base_key
            || key
                .strip_prefix(base_key)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
