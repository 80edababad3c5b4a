use crate::spec::{BodyAssertions, CodeRange, LengthBounds};
use serde::Serialize;

/// The parts of an HTTP response a plan can assert on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

impl ProbeResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub async fn from_response(response: reqwest::Response) -> reqwest::Result<Self> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Self { status, body })
    }
}

impl CodeRange {
    pub fn contains(&self, status: u16) -> bool {
        let status = i64::from(status);
        status >= self.gte.unwrap_or(0) && self.lt.is_none_or(|lt| status < lt)
    }
}

impl LengthBounds {
    pub fn accepts(&self, length: usize) -> bool {
        let length = i64::try_from(length).unwrap_or(i64::MAX);
        self.gt.is_none_or(|gt| length > gt)
            && self.lt.is_none_or(|lt| length < lt)
            && self.eq.is_none_or(|eq| length == eq)
    }
}

impl BodyAssertions {
    pub fn matches(&self, body: &str) -> bool {
        if let Some(length) = &self.length
            && !length.accepts(body.chars().count())
        {
            return false;
        }

        if let Some(all) = &self.contains_all
            && !all.iter().all(|needle| body.contains(needle.as_str()))
        {
            return false;
        }

        // an empty list can never be satisfied
        if let Some(either) = &self.contains_either
            && !either.iter().any(|needle| body.contains(needle.as_str()))
        {
            return false;
        }

        true
    }
}

/// Decide whether a response satisfies a plan's validation block.
///
/// Absent checks are skipped, so a plan with neither a code range nor body
/// assertions matches every response.
pub fn evaluate(
    response: &ProbeResponse,
    code_range: Option<&CodeRange>,
    body: Option<&BodyAssertions>,
) -> bool {
    if let Some(range) = code_range
        && !range.contains(response.status)
    {
        return false;
    }

    body.is_none_or(|assertions| assertions.matches(&response.body))
}
