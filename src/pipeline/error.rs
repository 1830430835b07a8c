//! Error types and reporting for pipeline stages.

use crate::error::VoxchainError;
use std::fmt;

/// Errors that can occur during stage processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Recoverable error. The driver turns it into an `Error` frame and the
    /// stream continues.
    Recoverable(String),
    /// Fatal error. The stage's stream ends and the failure propagates to
    /// every downstream consumer.
    Fatal(String),
}

impl StageError {
    /// Classifies a service failure as recoverable.
    pub fn recoverable(error: impl fmt::Display) -> Self {
        StageError::Recoverable(error.to_string())
    }

    /// Classifies a service failure as fatal.
    pub fn fatal(error: impl fmt::Display) -> Self {
        StageError::Fatal(error.to_string())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Fatal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            StageError::Recoverable(msg) | StageError::Fatal(msg) => msg,
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

impl From<VoxchainError> for StageError {
    /// Unclassified crate errors abort the stage.
    fn from(error: VoxchainError) -> Self {
        StageError::Fatal(error.to_string())
    }
}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error raised by a stage.
    fn report(&self, stage: &str, error: &StageError);
}

/// Error reporter that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => {
                tracing::warn!(stage, error = %msg, "stage reported a recoverable error")
            }
            StageError::Fatal(msg) => {
                tracing::error!(stage, error = %msg, "stage failed")
            }
        }
    }
}
