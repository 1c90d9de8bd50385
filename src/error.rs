//! Error types for the sandbox engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the engine's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sandbox engine
#[derive(Error, Debug)]
pub enum Error {
    /// The container daemon could not be reached or a daemon call failed
    #[error("Docker is not available: {0}")]
    DaemonUnavailable(String),

    /// A locally built image is missing, or a pull/build failed
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    /// Container create or start failed
    #[error("Failed to start container: {0}")]
    ContainerStart(String),

    /// Wall-clock limit exceeded; the container was killed
    #[error("Execution timeout after {0}ms")]
    ExecutionTimeout(u64),

    /// The container ran to completion with a non-zero status
    #[error("Exit code: {0}")]
    NonZeroExit(i64),

    /// A single output file could not be read
    #[error("Failed to read artifact {name}: {reason}")]
    ArtifactRead { name: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable failure class attached to execution results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    DaemonUnavailable,
    ImageUnavailable,
    ContainerStartFailure,
    ExecutionTimeout,
    NonZeroExit,
    ArtifactReadFailure,
    InvalidInput,
    Internal,
}

impl Error {
    /// Classify the error for callers that branch on failure origin
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DaemonUnavailable(_) => ErrorKind::DaemonUnavailable,
            Error::ImageUnavailable(_) => ErrorKind::ImageUnavailable,
            Error::ContainerStart(_) => ErrorKind::ContainerStartFailure,
            Error::ExecutionTimeout(_) => ErrorKind::ExecutionTimeout,
            Error::NonZeroExit(_) => ErrorKind::NonZeroExit,
            Error::ArtifactRead { .. } => ErrorKind::ArtifactReadFailure,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Config(_) | Error::Json(_) | Error::Io(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::DaemonUnavailable(err.to_string())
    }
}
