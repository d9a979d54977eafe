//! Error types for worklog
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, empty selection, unknown project)
//! - 4: Operation failed (git error, AI request, IO)

use std::path::PathBuf;
use thiserror::Error;

use crate::ai::AiError;
use crate::git::InvocationError;

/// Exit codes for the worklog CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for worklog operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid time window: since ({since}) is after until ({until})")]
    InvalidTimeWindow { since: String, until: String },

    #[error("Nothing selected: {0}")]
    ZeroSelection(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("A collection run is already in progress")]
    RunInProgress,

    // Operation failures (exit code 4)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Git invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("AI request failed: {0}")]
    Ai(#[from] AiError),

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

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotARepo(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::InvalidTimeWindow { .. }
            | Error::ZeroSelection(_)
            | Error::ProjectNotFound(_)
            | Error::AccountNotFound(_)
            | Error::RunInProgress => exit_codes::USER_ERROR,

            Error::Git(_)
            | Error::Invocation(_)
            | Error::Ai(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured context for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidTimeWindow { since, until } => {
                Some(serde_json::json!({ "since": since, "until": until }))
            }
            Error::NotARepo(path) | Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path.display().to_string() }))
            }
            Error::ProjectNotFound(name) => Some(serde_json::json!({ "project": name })),
            Error::AccountNotFound(name) => Some(serde_json::json!({ "account": name })),
            _ => None,
        }
    }

    /// Short machine-readable category used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self.exit_code() {
            exit_codes::USER_ERROR => "user_error",
            _ => "operation_failed",
        }
    }
}

/// Result type alias for worklog operations
pub type Result<T> = std::result::Result<T, Error>;
