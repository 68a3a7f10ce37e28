use crate::resilience::retry::RetryableError;
use thiserror::Error;

/// Failures reported by a device driver or by an operation run against a session.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Authentication rejected: {0}")]
    AuthenticationFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Liveness probe failed: {0}")]
    ProbeFailed(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking worker failed: {0}")]
    Worker(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl RetryableError for DeviceError {
    fn is_retryable(&self) -> bool {
        match self {
            // A malformed endpoint will not get better by trying again
            DeviceError::InvalidEndpoint(_) => false,
            _ => true,
        }
    }
}

impl DeviceError {
    /// Sort an I/O error into the categories the pool reports on.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => DeviceError::ConnectionRefused(err.to_string()),
            std::io::ErrorKind::TimedOut => DeviceError::Timeout(err.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                DeviceError::AuthenticationFailed(err.to_string())
            }
            _ => DeviceError::Io(err),
        }
    }
}
