//! Error types for the HTTP delegate.

use crate::codec::CodecError;
use delegate_routing::DelegateError;
use thiserror::Error;

/// Errors that can occur talking to the delegate over HTTP.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request to {command} failed: {source}")]
    Request {
        command: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{command} returned {status}: {message}")]
    Status {
        command: &'static str,
        status: u16,
        message: String,
    },

    #[error("Swarm connect to {addr} failed: {message}")]
    ConnectFailed { addr: String, message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Record key is not valid UTF-8: {0}")]
    InvalidKey(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<HttpError> for DelegateError {
    fn from(err: HttpError) -> Self {
        DelegateError::Remote(err.to_string())
    }
}
