use crate::error::{Result, ScanError};
use crate::result::{Direction, ObservedCall, PageCalls, ResourceKind};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    ResourceType,
};
use futures::{Stream, StreamExt, stream};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Renders one page and reports the network calls its scripts made.
#[allow(async_fn_in_trait)]
pub trait PageObserver {
    async fn observe_page(&mut self, url: &str) -> Result<Vec<ObservedCall>>;
}

/// Observe every page in order. A page that fails to render is logged and left out.
pub async fn observe_pages<O: PageObserver>(
    observer: &mut O,
    pages: &[String],
) -> BTreeMap<String, PageCalls> {
    let mut calls = BTreeMap::new();

    for (idx, page) in pages.iter().enumerate() {
        debug!("Observing page {}/{}: {}", idx + 1, pages.len(), page);
        match observer.observe_page(page).await {
            Ok(observed) => {
                calls.insert(page.clone(), PageCalls::from_calls(&observed));
            }
            Err(e) => {
                warn!("Error processing {}: {}", page, e);
            }
        }
    }

    calls
}

/// Launch a browser, observe `pages`, and shut the browser down again
/// whatever happened in between.
pub async fn observe_with_browser(
    pages: &[String],
    config: ObserverConfig,
) -> Result<BTreeMap<String, PageCalls>> {
    let mut observer = BrowserObserver::launch(config).await?;
    let calls = observe_pages(&mut observer, pages).await;

    if let Err(e) = observer.close().await {
        warn!("Browser did not shut down cleanly: {}", e);
    }

    Ok(calls)
}

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Upper bound on navigation plus settling for one page.
    pub render_timeout: Duration,
    /// The page counts as settled once nothing is in flight and no network
    /// event arrived for this long.
    pub idle_window: Duration,
    pub executable: Option<PathBuf>,
    pub sandbox: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(30),
            idle_window: Duration::from_millis(500),
            executable: None,
            sandbox: false,
        }
    }
}

impl ObserverConfig {
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_idle_window(mut self, idle_window: Duration) -> Self {
        self.idle_window = idle_window;
        self
    }

    pub fn with_executable(mut self, path: PathBuf) -> Self {
        self.executable = Some(path);
        self
    }
}

/// Headless Chromium driven over the DevTools protocol.
pub struct BrowserObserver {
    browser: Browser,
    handler: JoinHandle<()>,
    config: ObserverConfig,
}

impl BrowserObserver {
    pub async fn launch(config: ObserverConfig) -> Result<Self> {
        info!("Launching headless browser for API call observation");

        let mut builder = BrowserConfig::builder()
            .request_timeout(config.render_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(ScanError::BrowserError)?;

        let (browser, mut handler) = Browser::launch(browser_config).await?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            handler,
            config,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        self.browser.wait().await?;
        self.handler.abort();
        Ok(())
    }

    async fn record_page(&self, page: &Page, url: &str) -> Result<Vec<ObservedCall>> {
        let origin = url.to_string();
        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await?
            .map(move |event| NetworkEvent::RequestSent {
                request_id: event.request_id.inner().clone(),
                call: ObservedCall::new(
                    origin.clone(),
                    Direction::Request,
                    resource_kind(event.r#type.as_ref()),
                    event.request.url.clone(),
                ),
            });
        let origin = url.to_string();
        let responses = page
            .event_listener::<EventResponseReceived>()
            .await?
            .map(move |event| NetworkEvent::ResponseReceived {
                call: ObservedCall::new(
                    origin.clone(),
                    Direction::Response,
                    resource_kind(Some(&event.r#type)),
                    event.response.url.clone(),
                ),
            });
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await?
            .map(|event| NetworkEvent::Finished {
                request_id: event.request_id.inner().clone(),
            });
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|event| NetworkEvent::Finished {
                request_id: event.request_id.inner().clone(),
            });
        let mut events = Box::pin(stream::select(
            stream::select(requests, responses),
            stream::select(finished, failed),
        ));

        let deadline = Instant::now() + self.config.render_timeout;
        tokio::time::timeout(self.config.render_timeout, page.goto(url))
            .await
            .map_err(|_| ScanError::BrowserError(format!("navigation to {} timed out", url)))??;

        match wait_for_network_idle(&mut events, self.config.idle_window, deadline).await {
            Settle::Idle(calls) => Ok(calls),
            Settle::TimedOut { in_flight, .. } => Err(ScanError::BrowserError(format!(
                "{} never went network-idle ({} requests in flight)",
                url, in_flight
            ))),
        }
    }
}

impl PageObserver for BrowserObserver {
    async fn observe_page(&mut self, url: &str) -> Result<Vec<ObservedCall>> {
        // A fresh tab per page keeps listeners from leaking across pages.
        let page = self.browser.new_page("about:blank").await?;
        let outcome = self.record_page(&page, url).await;

        if let Err(e) = page.close().await {
            debug!("Closing tab for {} failed: {}", url, e);
        }

        outcome
    }
}

impl Drop for BrowserObserver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// One DevTools network event, reduced to what settling needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    RequestSent { request_id: String, call: ObservedCall },
    ResponseReceived { call: ObservedCall },
    /// The request finished loading or failed.
    Finished { request_id: String },
}

/// How waiting for a page to go quiet ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settle {
    /// Nothing was in flight and no event arrived for a whole idle window.
    Idle(Vec<ObservedCall>),
    /// The deadline passed first.
    TimedOut {
        calls: Vec<ObservedCall>,
        in_flight: usize,
    },
}

/// Collect data calls from `events` until the page is network-idle: no
/// request in flight and no event for `idle_window`. Gives up at `deadline`.
pub async fn wait_for_network_idle<S>(
    events: &mut S,
    idle_window: Duration,
    deadline: Instant,
) -> Settle
where
    S: Stream<Item = NetworkEvent> + Unpin,
{
    let mut in_flight: HashSet<String> = HashSet::new();
    let mut calls = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Settle::TimedOut {
                calls,
                in_flight: in_flight.len(),
            };
        }

        let wait = idle_window.min(remaining);
        let event = match tokio::time::timeout(wait, events.next()).await {
            Ok(Some(event)) => event,
            // The listeners only close with the tab.
            Ok(None) => return Settle::Idle(calls),
            Err(_) if wait < idle_window => {
                return Settle::TimedOut {
                    calls,
                    in_flight: in_flight.len(),
                };
            }
            Err(_) if in_flight.is_empty() => return Settle::Idle(calls),
            Err(_) => {
                debug!("  quiet, but {} requests still in flight", in_flight.len());
                continue;
            }
        };

        let call = match event {
            NetworkEvent::RequestSent { request_id, call } => {
                in_flight.insert(request_id);
                call
            }
            NetworkEvent::ResponseReceived { call } => call,
            NetworkEvent::Finished { request_id } => {
                in_flight.remove(&request_id);
                continue;
            }
        };
        if call.resource_kind.is_data_call() {
            debug!("  {:?} {}", call.direction, call.url);
            calls.push(call);
        }
    }
}

fn resource_kind(resource_type: Option<&ResourceType>) -> ResourceKind {
    match resource_type {
        Some(ResourceType::Xhr) => ResourceKind::Xhr,
        Some(ResourceType::Fetch) => ResourceKind::Fetch,
        _ => ResourceKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_classification() {
        assert_eq!(resource_kind(Some(&ResourceType::Xhr)), ResourceKind::Xhr);
        assert_eq!(resource_kind(Some(&ResourceType::Fetch)), ResourceKind::Fetch);
        assert_eq!(resource_kind(Some(&ResourceType::Image)), ResourceKind::Other);
        assert_eq!(resource_kind(None), ResourceKind::Other);
    }
}
