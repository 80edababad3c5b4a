// Probe execution: expand a plan's word list against an endpoint and test each URL

use crate::error::ProbeError;
use crate::evaluate::{ProbeResponse, evaluate};
use crate::spec::TestPlan;
use apiward_scanner::FetchError;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("apiward/", env!("CARGO_PKG_VERSION"));

/// Sends probe requests and evaluates them against a [`TestPlan`].
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    client: Client,
}

impl ProbeExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build an executor around a fresh client with the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self::new(client))
    }

    /// Run `plan` against `endpoint`.
    ///
    /// With a word list, candidate URLs are tried in order and the first one
    /// that matches wins; later words are never requested. Without one, the
    /// bare endpoint is requested once.
    pub async fn execute(&self, endpoint: &str, plan: &TestPlan) -> Result<bool, ProbeError> {
        if plan.word_list.is_empty() {
            let response = self.fetch(endpoint).await?;
            return Ok(self.matches(&response, plan));
        }

        for word in &plan.word_list {
            let url = build_probe_url(endpoint, word);
            let response = self.fetch(&url).await?;
            if self.matches(&response, plan) {
                debug!("{} matched with status {}", url, response.status);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// GET `url` and capture its status and body. Non-success statuses are
    /// ordinary responses here, only transport failures are errors.
    pub async fn fetch(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let fetch_error = |e: reqwest::Error| ProbeError::Fetch {
            url: url.to_string(),
            source: FetchError::from(e),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        ProbeResponse::from_response(response)
            .await
            .map_err(fetch_error)
    }

    fn matches(&self, response: &ProbeResponse, plan: &TestPlan) -> bool {
        evaluate(
            response,
            plan.response_code.as_ref(),
            plan.response_payload.as_ref(),
        )
    }
}

/// Build the URL requested for one word-list entry.
///
/// The endpoint gets a trailing `/`; every `{name}` placeholder in it is
/// replaced by `word`, and `word` is then appended as the last path segment.
pub fn build_probe_url(endpoint: &str, word: &str) -> String {
    let base = if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{}/", endpoint)
    };

    let base = if has_placeholder(&base) {
        fill_placeholders(&base, word)
    } else {
        base
    };

    format!("{}{}", base, word)
}

/// Every candidate URL for `endpoint`, in the order they would be tried.
pub fn build_probe_urls(endpoint: &str, words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|word| build_probe_url(endpoint, word))
        .collect()
}

pub fn has_placeholder(endpoint: &str) -> bool {
    endpoint
        .find('{')
        .is_some_and(|open| endpoint[open..].contains('}'))
}

fn fill_placeholders(template: &str, word: &str) -> String {
    let mut filled = String::with_capacity(template.len() + word.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        filled.push_str(&rest[..open]);
        filled.push_str(word);
        rest = &rest[open + close + 1..];
    }

    filled.push_str(rest);
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_placeholders() {
        assert_eq!(fill_placeholders("/users/{id}/", "7"), "/users/7/");
        assert_eq!(fill_placeholders("/{a}/{b}", "x"), "/x/x");
        assert_eq!(fill_placeholders("/open{brace/", "x"), "/open{brace/");
    }

    #[test]
    fn test_has_placeholder() {
        assert!(has_placeholder("https://example.com/users/{username}"));
        assert!(!has_placeholder("https://example.com/users"));
        assert!(!has_placeholder("https://example.com/}weird{"));
    }
}
