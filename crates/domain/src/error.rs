//! Error kinds shared across the engine.
//!
//! `ErrorKind` is the vocabulary surfaced in `CommandResult.error` and in
//! event payloads (see the command/event protocol). `Error` is the
//! richer internal error type that every fallible operation returns;
//! it carries enough detail to be downgraded into a `CommandResult` at
//! the dispatcher boundary without losing the kind.

use serde::{Deserialize, Serialize};

/// The fixed vocabulary of error kinds a command result or event may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    InvalidState,
    Timeout,
    Cancelled,
    BudgetExceeded,
    BackendError,
    UpstreamError,
    CircuitOpen,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidState => "invalid_state",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::BudgetExceeded => "budget_exceeded",
            Self::BackendError => "backend_error",
            Self::UpstreamError => "upstream_error",
            Self::CircuitOpen => "circuit_open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            Error::Backend(_) => ErrorKind::BackendError,
            Error::Upstream { .. } => ErrorKind::UpstreamError,
            Error::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Error::Io(_) | Error::Json(_) | Error::Http(_) | Error::Other(_) => {
                ErrorKind::BackendError
            }
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid_input(what: impl Into<String>) -> Self {
        Error::InvalidInput(what.into())
    }

    pub fn invalid_state(what: impl Into<String>) -> Self {
        Error::InvalidState(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
