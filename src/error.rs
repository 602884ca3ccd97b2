//! Error handling and custom error types
//!
//! Provides unified error handling across the converter using thiserror, plus the
//! coarse [`ErrorKind`] taxonomy that sessions record and front ends branch on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Conversion service unreachable: {0}")]
    Unreachable(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Unsupported conversion: {0}")]
    Unsupported(String),

    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy image: {0}")]
    CopyFailed(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories surfaced to callers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidState,
    NotConfigured,
    Unreachable,
    Timeout,
    Unsupported,
    DirectoryCreateFailed,
    CopyFailed,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::NotConfigured => "not configured",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::DirectoryCreateFailed => "directory create failed",
            ErrorKind::CopyFailed => "copy failed",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::NotConfigured(_) => ErrorKind::NotConfigured,
            Error::Unreachable(_) => ErrorKind::Unreachable,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Unsupported(_) | Error::Image(_) => ErrorKind::Unsupported,
            Error::DirectoryCreateFailed { .. } => ErrorKind::DirectoryCreateFailed,
            Error::CopyFailed(_) => ErrorKind::CopyFailed,
            Error::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Error::Http(_) => ErrorKind::Unreachable,
            Error::Invariant(_) => ErrorKind::Internal,
        }
    }

    /// Classifies a transport failure from an outbound HTTP call.
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Unreachable(e.to_string())
        }
    }
}

/// Cloneable record of a failure, kept on the session as `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorInfo {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::InvalidState("x".to_string()).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            Error::Unsupported("x".to_string()).kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            Error::Invariant("broken".to_string()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            Error::DirectoryCreateFailed {
                path: PathBuf::from("/nope"),
                source: std::io::Error::other("denied"),
            }
            .kind(),
            ErrorKind::DirectoryCreateFailed
        );
    }

    #[test]
    fn test_error_info_keeps_message_and_kind() {
        let error = Error::Timeout("upload took too long".to_string());
        let info = ErrorInfo::from(&error);

        assert_eq!(info.kind, ErrorKind::Timeout);
        assert!(info.message.contains("upload took too long"));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DirectoryCreateFailed).unwrap();
        assert_eq!(json, "\"directory_create_failed\"");
    }
}
