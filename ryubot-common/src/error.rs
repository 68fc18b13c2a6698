//! Error types for RyuBot.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the RyuBot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort start-up.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Process exit code for this error when it aborts start-up.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78, // EX_CONFIG
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}
