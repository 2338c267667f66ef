//! Error types for mpctl-player
//!
//! Every failure in the control core is a value: either returned from a
//! command call or delivered as a `PlayerEvent::Error` notification.

use mpctl_common::ErrorCode;
use thiserror::Error;

/// Main error type for the playback control core
#[derive(Error, Debug)]
pub enum Error {
    /// Command not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Argument out of range or malformed
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Source or feature not supported
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Media engine request failed
    #[error("Engine error: {0}")]
    Engine(String),

    /// Operation did not complete in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Controller or dispatcher already torn down
    #[error("Released: {0}")]
    Released(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Notification code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidState(_) => ErrorCode::InvalidOperation,
            Error::InvalidValue(_) => ErrorCode::InvalidValue,
            Error::Unsupported(_) => ErrorCode::Unsupported,
            Error::Engine(_) => ErrorCode::EngineFailure,
            Error::Timeout(_) => ErrorCode::Timeout,
            Error::Released(_) | Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                ErrorCode::Unknown
            }
        }
    }
}

impl From<mpctl_common::Error> for Error {
    fn from(err: mpctl_common::Error) -> Self {
        match err {
            mpctl_common::Error::Io(e) => Error::Io(e),
            mpctl_common::Error::Config(msg) => Error::Config(msg),
        }
    }
}

/// Convenience Result type using mpctl-player Error
pub type Result<T> = std::result::Result<T, Error>;
