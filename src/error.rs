//! Error types for questlog
//!
//! Every failure falls into one of a few classes:
//! - Validation: a malformed draft (missing title, bad category)
//! - NotFound: an operation referenced an id that does not exist
//! - Backend: network or storage failure, with the backend cause wrapped
//! - Session: an operation needed an identity and none was signed in
//! - Usage: bad CLI arguments or configuration
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, validation, missing task, no session)
//! - 4: Operation failed (backend error)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the questlog CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Backend,
    Session,
    Usage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Backend => "backend",
            ErrorKind::Session => "session",
            ErrorKind::Usage => "usage",
        }
    }
}

/// Main error type for questlog operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid task: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("No active session; sign in first")]
    NoSession,

    #[error("Task store has been shut down")]
    StoreClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Backend failures
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NoSession | Error::StoreClosed => ErrorKind::Session,
            Error::InvalidConfig(_) | Error::InvalidArgument(_) => ErrorKind::Usage,
            Error::Backend(_)
            | Error::Http(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => ErrorKind::Backend,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation
            | ErrorKind::NotFound
            | ErrorKind::Session
            | ErrorKind::Usage => exit_codes::USER_ERROR,
            ErrorKind::Backend => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON output, when the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotFound(id) => Some(serde_json::json!({ "id": id })),
            Error::Validation(message)
            | Error::InvalidConfig(message)
            | Error::InvalidArgument(message)
            | Error::Backend(message) => Some(serde_json::json!({ "message": message })),
            Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path.display().to_string() }))
            }
            _ => None,
        }
    }
}

/// Result type alias for questlog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub kind: &'static str,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            kind: err.kind().as_str(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
