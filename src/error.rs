//! Error types and handling.

use thiserror::Error;

use crate::fms::FmsError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Protocol engine error
    #[error("FMS error: {0}")]
    Fms(#[from] FmsError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed trace or hex input
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// JSON output failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create a parse error with message
    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }
}
