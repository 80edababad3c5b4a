use crate::error::{CoreError, Result};
use apiward_scanner::{
    CrawlConfig, Crawler, ObserverConfig, PageCalls, PageObserver, ProgressCallback,
    ResolveOptions, observe_pages, observe_with_browser, resolve_with,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;
use url::Url;

/// Options for one discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub crawl: CrawlConfig,
    pub observer: ObserverConfig,
    pub resolve: ResolveOptions,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    pub crawled_pages: Vec<String>,
    pub api_endpoints: Vec<String>,
}

/// Check that `domain` is an absolute http(s) URL.
pub fn validate_domain(domain: &str) -> Result<()> {
    if !(domain.starts_with("http://") || domain.starts_with("https://")) {
        return Err(CoreError::InvalidInput(format!(
            "Domain must start with http:// or https://: {}",
            domain
        )));
    }
    Url::parse(domain)
        .map_err(|e| CoreError::InvalidInput(format!("Invalid domain '{}': {}", domain, e)))?;
    Ok(())
}

/// Crawl `domain`, render every page in a headless browser and collect the
/// API endpoints the pages called.
pub async fn discover(domain: &str, options: &DiscoveryOptions) -> Result<DiscoveryOutcome> {
    validate_domain(domain)?;

    let crawled_pages = crawl_pages(domain, options).await?;
    let calls = observe_with_browser(&crawled_pages, options.observer.clone()).await?;

    Ok(finish(domain, crawled_pages, &calls, &options.resolve))
}

/// Same as [`discover`] with a caller-supplied page observer.
pub async fn discover_with_observer<O: PageObserver>(
    domain: &str,
    options: &DiscoveryOptions,
    observer: &mut O,
) -> Result<DiscoveryOutcome> {
    validate_domain(domain)?;

    let crawled_pages = crawl_pages(domain, options).await?;
    let calls = observe_pages(observer, &crawled_pages).await;

    Ok(finish(domain, crawled_pages, &calls, &options.resolve))
}

async fn crawl_pages(domain: &str, options: &DiscoveryOptions) -> Result<Vec<String>> {
    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let mut crawler = Crawler::with_config(options.crawl.clone())?;

    if let Some(pb) = progress_bar.clone() {
        let processed_count = Arc::new(AtomicUsize::new(0));
        let callback: ProgressCallback = Arc::new(move |_count: usize, url: String| {
            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("Crawling... {} pages fetched ({})", count, url));
            pb.tick();
        });
        crawler = crawler.with_progress_callback(callback);
    }

    let summary = crawler.crawl(domain).await;

    if let Some(pb) = progress_bar {
        match &summary {
            Ok(s) => pb.finish_with_message(format!(
                "Crawl complete: {} pages, {} failed",
                s.visited.len(),
                s.failed.len()
            )),
            Err(_) => pb.abandon_with_message("Crawl failed"),
        }
    }

    let summary = summary?;
    info!(
        "Crawled {} pages ({} failed) in {:.1}s{}",
        summary.visited.len(),
        summary.failed.len(),
        summary.elapsed.as_secs_f64(),
        if summary.truncated { ", truncated" } else { "" }
    );

    Ok(summary.visited)
}

fn finish(
    domain: &str,
    crawled_pages: Vec<String>,
    calls: &BTreeMap<String, PageCalls>,
    resolve: &ResolveOptions,
) -> DiscoveryOutcome {
    let api_endpoints = resolve_with(calls, domain, resolve);
    info!("Resolved {} API endpoints under {}", api_endpoints.len(), domain);

    DiscoveryOutcome {
        crawled_pages,
        api_endpoints,
    }
}
