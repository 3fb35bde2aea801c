// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolkitError>;

/// Protocol violations on a [`crate::progress::Progress`]. These are
/// programmer errors and are returned immediately to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Cannot {operation} a progress that already reached a terminal state")]
    AlreadyFinished { operation: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Request could not be authorized, because no auth token is set")]
    MissingAuthToken,

    #[error("Authorization token is not valid: {0}")]
    InvalidAuthToken(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HttpError::Decode(err.to_string())
        } else {
            HttpError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("'{name}' was not found in the service registry. Services: {}", available.join(", "))]
    NotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Service '{name}' is not of the requested type {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModalError {
    #[error("Cannot open modal '{id}': limit of {limit} open modals reached")]
    LimitReached { id: String, limit: usize },

    #[error("Modal '{0}' is already open")]
    AlreadyOpen(String),

    #[error("Modal '{0}' is not registered")]
    NotFound(String),

    #[error("Modal '{0}' is not open")]
    NotOpen(String),
}

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Modal(#[from] ModalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
