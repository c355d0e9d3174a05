//! Error taxonomy for the fileward engine.
//!
//! Filesystem operations raise the specific kind, the impersonation layer
//! passes kinds through unchanged, and the dispatcher is the single place
//! where kinds become caller-facing `{code, message}` bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by filesystem operations and the layers above them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    /// The requested file or directory was not found.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The OS denied access under the effective identity.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A creation or rename target already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A non-recursive delete hit a directory that still has entries.
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// A bulk transfer collided with existing names.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed request or an OS error with no more specific kind.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The impersonation machinery failed to start or communicate.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fieldless mirror of [`FileError`] variants.
///
/// Used wherever an error has to travel as data, e.g. from an
/// impersonated child process back to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    DirectoryNotEmpty,
    Conflict,
    BadRequest,
    Internal,
}

impl ErrorKind {
    /// Numeric code carried in action error bodies.
    pub fn code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::PermissionDenied => 401,
            Self::AlreadyExists | Self::DirectoryNotEmpty | Self::Conflict | Self::BadRequest => {
                400
            }
            Self::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "File Not Found",
            Self::PermissionDenied => "Permission Denied",
            Self::AlreadyExists => "File Already Exists",
            Self::DirectoryNotEmpty => "Directory Not Empty",
            Self::Conflict => "File Already Exists",
            Self::BadRequest => "Bad request",
            Self::Internal => "Internal Error",
        }
    }
}

impl FileError {
    /// Rebuild an error from its kind and detail message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            ErrorKind::AlreadyExists => Self::AlreadyExists(message),
            ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::BadRequest => Self::BadRequest(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::DirectoryNotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The detail message without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::PermissionDenied(m)
            | Self::AlreadyExists(m)
            | Self::DirectoryNotEmpty(m)
            | Self::Conflict(m)
            | Self::BadRequest(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Map `std::io::Error` to `FileError` based on error kind and errno.
pub fn map_io_error(e: std::io::Error, path: &str) -> FileError {
    #[cfg(unix)]
    if let Some(errno) = e.raw_os_error() {
        match errno {
            libc::ENOENT | libc::ENOTDIR => return FileError::NotFound(path.to_string()),
            libc::EACCES | libc::EPERM => return FileError::PermissionDenied(path.to_string()),
            libc::EEXIST => return FileError::AlreadyExists(path.to_string()),
            libc::ENOTEMPTY => return FileError::DirectoryNotEmpty(path.to_string()),
            _ => {}
        }
    }

    match e.kind() {
        std::io::ErrorKind::NotFound => FileError::NotFound(path.to_string()),
        std::io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path.to_string()),
        std::io::ErrorKind::AlreadyExists => FileError::AlreadyExists(path.to_string()),
        _ => FileError::BadRequest(format!("{}: {}", path, e)),
    }
}
