use apiward_scanner::{FetchError, ScanError};
use thiserror::Error;

/// Why a stored test payload could not be turned into a plan.
#[derive(Error, Debug)]
pub enum SpecificationError {
    #[error("test payload is empty")]
    Empty,

    #[error("malformed test payload: {0}")]
    Malformed(#[from] serde_yaml::Error),

    #[error("response_code range is empty: gte {gte} is not below lt {lt}")]
    EmptyCodeRange { gte: i64, lt: i64 },
}

/// Failure while sending a probe request or reading its response.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Invalid test specification: {0}")]
    Specification(#[from] SpecificationError),

    #[error("Request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        CoreError::NotFound { kind, id }
    }

    /// True for failures caused by the caller's input rather than by the
    /// system or the network.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::InvalidInput(_) | CoreError::NotFound { .. })
    }
}

impl From<ProbeError> for CoreError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Fetch { url, source } => CoreError::Fetch { url, source },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
