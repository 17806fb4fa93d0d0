use std::time::Duration;

use crate::types::ResourceKind;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures reported by a [`ResourceClient`](crate::ResourceClient).
///
/// `NotFound` is the only variant the verification engine treats as a
/// signal rather than a failure, so backends must map "absent" onto it and
/// nothing else.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("conflict on {kind} {name}: {message}")]
    Conflict {
        kind: ResourceKind,
        name: String,
        message: String,
    },

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ClientError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        ClientError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, name: impl Into<String>) -> Self {
        ClientError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}
