use thiserror::Error;

/// Per-call failures from the user directory upstreams.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("user not found")]
    NotFound,

    #[error("{0}")]
    Upstream(String),
}

impl From<outbound::OutboundError> for DirectoryError {
    fn from(err: outbound::OutboundError) -> Self {
        DirectoryError::Upstream(err.to_string())
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        DirectoryError::Upstream(err.to_string())
    }
}

/// Request-level aggregation failures surfaced to the gateway.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Upstream(String),
}
