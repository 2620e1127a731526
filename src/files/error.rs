//! File access error types

use thiserror::Error;

/// Errors raised by the path sandbox and the file store.
///
/// The `Display` text is what the server sees in an `ERROR` envelope, so it
/// stays short and never includes physical paths.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Invalid path")]
    InvalidPath,

    #[error("Access denied")]
    AccessDenied,

    #[error("Path traversal")]
    TraversalDetected,

    #[error("Not a file")]
    NotAFile,

    #[error("Not a directory")]
    NotADirectory,

    #[error("File type not allowed")]
    TypeNotAllowed,

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("File already exists")]
    AlreadyExists,

    #[error("File not found")]
    NotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileError {
    /// True for the errors that mean the caller tried to leave the sandbox.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath | Self::AccessDenied | Self::TraversalDetected
        )
    }
}
