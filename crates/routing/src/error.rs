//! Error types for delegated routing.

use crate::delegate::DelegateError;
use delegate_dispatch::AdmissionError;
use std::fmt;
use thiserror::Error;

/// The routing operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FindProviders,
    Provide,
    BlockStat,
    Connect,
    Put,
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::FindProviders => "find_providers",
            Operation::Provide => "provide",
            Operation::BlockStat => "block_stat",
            Operation::Connect => "connect",
            Operation::Put => "put",
            Operation::Get => "get",
        };
        f.write_str(name)
    }
}

/// Errors surfaced to callers of [`DelegatedRouting`](crate::DelegatedRouting).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The call was dropped from its queue or cancelled while running.
    #[error("{op} for {key} aborted: {cause}")]
    Aborted {
        op: Operation,
        key: String,
        cause: AdmissionError,
    },

    /// The delegate reported a failure.
    #[error("{op} for {key} failed on the delegate: {message}")]
    RemoteCallFailed {
        op: Operation,
        key: String,
        message: String,
    },

    /// No relay candidate could connect the delegate back to us.
    #[error("Unable to connect the delegate to us using any of {attempted} relays (announcing {key})")]
    ConnectivityExhausted { key: String, attempted: usize },

    /// A get finished without the delegate producing a value.
    #[error("No value found for {key}")]
    NotFound { key: String },

    /// The client was constructed with an unusable configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RoutingError {
    pub(crate) fn aborted(op: Operation, key: impl fmt::Display, cause: AdmissionError) -> Self {
        RoutingError::Aborted {
            op,
            key: key.to_string(),
            cause,
        }
    }

    pub(crate) fn from_delegate(op: Operation, key: impl fmt::Display, err: DelegateError) -> Self {
        match err {
            DelegateError::Remote(message) => RoutingError::RemoteCallFailed {
                op,
                key: key.to_string(),
                message,
            },
            DelegateError::Aborted(reason) => {
                Self::aborted(op, key, AdmissionError::Aborted(reason))
            }
        }
    }

    /// Whether this is an aborted-class error a caller may retry.
    pub fn is_aborted(&self) -> bool {
        matches!(self, RoutingError::Aborted { .. })
    }

    /// The operation that failed, if the error belongs to one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            RoutingError::Aborted { op, .. } | RoutingError::RemoteCallFailed { op, .. } => {
                Some(*op)
            }
            RoutingError::ConnectivityExhausted { .. } => Some(Operation::Connect),
            RoutingError::NotFound { .. } => Some(Operation::Get),
            RoutingError::InvalidConfig(_) => None,
        }
    }
}
