//! Error types for the session orchestrator
//!
//! `SessionError` is what every orchestrator operation returns. Its `Display`
//! text is the message shown in the corresponding status region, so library
//! messages are carried through verbatim.

use thiserror::Error;

/// Errors returned by session operations
///
/// All errors are terminal for the triggering call only. Session state is
/// rolled back to its pre-call value before an error is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The messaging library never became available within the wait budget
    #[error(
        "Telegram library failed to load after {waited_ms} ms. Check the bridge installation or restart the client."
    )]
    LibraryUnavailable {
        /// How long the readiness gate waited before giving up
        waited_ms: u64,
    },

    /// Connect was called with a missing app id, secret, or session token
    #[error("{0}")]
    InvalidCredentials(String),

    /// Send was called with an empty target or message text
    #[error("{0}")]
    InvalidInput(String),

    /// The operation requires a connected client
    #[error("Please connect first")]
    NotConnected,

    /// The library failed to connect or to confirm the identity
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The library failed to fetch the conversation list
    #[error("Failed to fetch dialogs: {0}")]
    FetchFailed(String),

    /// The library refused the new-message subscription
    #[error("Failed to start listening: {0}")]
    ListenFailed(String),

    /// The library failed to deliver an outgoing message
    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

impl SessionError {
    /// True for errors produced by local validation that never reach the library
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidCredentials(_) | SessionError::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_messages_are_verbatim() {
        let err = SessionError::ConnectionFailed("AUTH_KEY_UNREGISTERED".to_string());
        assert_eq!(err.to_string(), "Connection failed: AUTH_KEY_UNREGISTERED");

        let err = SessionError::SendFailed("PEER_ID_INVALID".to_string());
        assert_eq!(err.to_string(), "Failed to send message: PEER_ID_INVALID");
    }

    #[test]
    fn test_validation_errors() {
        assert!(SessionError::InvalidInput("x".to_string()).is_validation());
        assert!(SessionError::InvalidCredentials("x".to_string()).is_validation());
        assert!(!SessionError::NotConnected.is_validation());
        assert!(!SessionError::LibraryUnavailable { waited_ms: 10 }.is_validation());
    }
}
