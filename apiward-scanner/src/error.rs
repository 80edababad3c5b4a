use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<chromiumoxide::error::CdpError> for ScanError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScanError::BrowserError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Failure of a single page fetch. Recorded by the crawler, never fatal to it.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let url = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            FetchError::Timeout(url)
        } else if let Some(status) = err.status() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            FetchError::Http(err)
        }
    }
}
