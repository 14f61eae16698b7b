//! Library-boundary error types
//!
//! Errors raised by a [`MessagingLibrary`](super::MessagingLibrary)
//! implementation. `Remote` carries the library's own message untouched so it
//! can be shown to the user verbatim.

use thiserror::Error;

/// Errors that can occur while talking to the messaging library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// Failed to start the library host (e.g. node not found)
    #[error("Failed to spawn bridge process: {0}")]
    Spawn(String),

    /// Reading from or writing to the library host failed
    #[error("Bridge I/O error: {0}")]
    Io(String),

    /// The library host sent something we could not understand
    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    /// The library reported an error
    #[error("{0}")]
    Remote(String),

    /// No response arrived in time
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The library host is gone
    #[error("Bridge process exited: {0}")]
    Closed(String),
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Protocol(err.to_string())
    }
}
