//! Server errors

use std::path::PathBuf;

/// Errors starting the document-root server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `start` was called on a running server
    #[error("Server is already listening on port {0}")]
    AlreadyRunning(u16),

    /// The document root is missing or not a directory
    #[error("Document root is not a directory: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// The listener could not be bound
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure while starting
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
