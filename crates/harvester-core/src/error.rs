//! Error types with operator-facing suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for protocol responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AlreadyRunning,
    NotRunning,
    InvalidInput,
    CommandFailed,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::AlreadyRunning => write!(f, "ALREADY_RUNNING"),
            ErrorCode::NotRunning => write!(f, "NOT_RUNNING"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::CommandFailed => write!(f, "COMMAND_FAILED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// An error response with a hint on how to recover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn already_running() -> Self {
        Self {
            code: ErrorCode::AlreadyRunning,
            message: "Controller loop is already running".to_string(),
            suggestion: Some("Run 'harvester stop' first if you want to restart it".into()),
        }
    }

    pub fn not_running() -> Self {
        Self {
            code: ErrorCode::NotRunning,
            message: "Controller loop is not running".to_string(),
            suggestion: Some("Run 'harvester start' to resume the controller".into()),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some("Check the command syntax and try again".into()),
        }
    }

    /// Create an invalid input error with a custom suggestion.
    pub fn invalid_input_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an error when a producer pushes more targets than allowed.
    pub fn too_many_targets(count: usize, max: usize) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("Received {} targets, the limit is {}", count, max),
            suggestion: Some(
                "Filter detections before pushing them; only the nearest targets are ever clicked"
                    .into(),
            ),
        }
    }

    /// Create an error for screenshots that could not be loaded.
    pub fn screenshot_unreadable(path: &str, error: &str) -> Self {
        Self {
            code: ErrorCode::CommandFailed,
            message: format!("Failed to load screenshot '{}': {}", path, error),
            suggestion: Some(
                "Pass an absolute path to a PNG or BMP file readable by the daemon".into(),
            ),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
            suggestion: Some("This is an internal error. Please report it if it persists.".into()),
        }
    }
}
