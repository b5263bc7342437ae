use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the trigger client and its collaborators.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("You must provide a valid API key")]
    MissingApiKey,

    /// Misuse of the client: missing ids, malformed time values, bad coordinates.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request would violate a trigger invariant. Raised before any network call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Alert API request failed with status {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse Alert API response: {0}")]
    Parse(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        AlertError::Parse(err.to_string())
    }
}

pub type Result<T, E = AlertError> = std::result::Result<T, E>;
