//! Error types for collaborator operations

use thiserror::Error;

/// Error returned by a [`MessageBackend`](crate::MessageBackend) operation.
///
/// The variants mirror how the engine reacts to them: validation and
/// authorization failures are surfaced and never retried, `NotFound` is a
/// stale reference that callers treat as a no-op, and `Transient` covers
/// network or backend hiccups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Input rejected (empty content, self-addressed message)
    #[error("validation error: {0}")]
    Validation(String),

    /// Acting identity is not the authenticated one
    #[error("auth error: {0}")]
    Auth(String),

    /// Acting identity may not touch this record
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or backend failure
    #[error("transient error: {0}")]
    Transient(String),
}

impl BackendError {
    /// Short, log-safe tag for the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Transient(_) => "transient",
        }
    }

    /// Whether a later attempt of the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Error returned when a push subscription cannot be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The transport could not reach the realtime service
    #[error("connect failed: {0}")]
    Connect(String),

    /// The realtime service rejected the channel join
    #[error("join rejected: {0}")]
    Rejected(String),

    /// The transport was shut down
    #[error("transport closed")]
    Closed,
}
