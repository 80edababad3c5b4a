use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Outcome of one frontier crawl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Pages fetched successfully, as the URLs that were requested.
    pub visited: Vec<String>,
    /// Normalised keys of pages whose fetch failed.
    pub failed: Vec<String>,
    pub elapsed: Duration,
    /// Set when a page or time limit stopped the crawl before the frontier drained.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Xhr,
    Fetch,
    Other,
}

impl ResourceKind {
    /// Programmatic data calls, as opposed to navigation, stylesheets, images...
    pub fn is_data_call(&self) -> bool {
        matches!(self, ResourceKind::Xhr | ResourceKind::Fetch)
    }
}

/// A network call issued by a page's scripts while it rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedCall {
    pub origin_page: String,
    pub direction: Direction,
    pub resource_kind: ResourceKind,
    pub url: String,
}

impl ObservedCall {
    pub fn new(
        origin_page: impl Into<String>,
        direction: Direction,
        resource_kind: ResourceKind,
        url: impl Into<String>,
    ) -> Self {
        Self {
            origin_page: origin_page.into(),
            direction,
            resource_kind,
            url: url.into(),
        }
    }
}

/// Data calls seen on a single page, split by direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCalls {
    pub requests: BTreeSet<String>,
    pub responses: BTreeSet<String>,
}

impl PageCalls {
    pub fn from_calls(calls: &[ObservedCall]) -> Self {
        let mut page = PageCalls::default();
        for call in calls.iter().filter(|c| c.resource_kind.is_data_call()) {
            match call.direction {
                Direction::Request => page.requests.insert(call.url.clone()),
                Direction::Response => page.responses.insert(call.url.clone()),
            };
        }
        page
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.responses.is_empty()
    }
}
