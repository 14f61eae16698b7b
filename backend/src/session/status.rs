//! Status projections
//!
//! Every user action reports a `{message, level}` pair into a named region of
//! the view. This module turns operation results into those pairs so the
//! rendering layer never has to inspect results itself.

use super::models::{identity_label, ConversationListing, Selection, SendReceipt};
use super::orchestrator::{ConnectOutcome, DisconnectOutcome, ListenOutcome, SessionUpdate};
use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Display region a status belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusRegion {
    /// Connection panel
    Connection,
    /// Dialog list panel
    Dialogs,
    /// Incoming message panel
    Messages,
    /// Send panel
    Send,
}

impl StatusRegion {
    /// Status shown while this region's action is in flight
    pub fn pending(&self) -> Status {
        let message = match self {
            StatusRegion::Connection => "Connecting to Telegram...",
            StatusRegion::Dialogs => "Fetching dialogs...",
            StatusRegion::Messages => "Starting listener...",
            StatusRegion::Send => "Sending message...",
        };
        Status::info(message)
    }
}

/// Severity marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Neutral or in-progress
    Info,
    /// Completed successfully
    Success,
    /// Failed
    Error,
}

/// A status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Severity marker
    pub level: Severity,
    /// Human-readable text
    pub message: String,
}

impl Status {
    /// Informational status
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Info,
            message: message.into(),
        }
    }

    /// Success status
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Success,
            message: message.into(),
        }
    }

    /// Error status
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Error,
            message: message.into(),
        }
    }

    /// Project an operation result, mapping every error to an error status
    pub fn of<T>(result: &Result<T, SessionError>) -> Self
    where
        T: Describe,
    {
        match result {
            Ok(value) => value.describe(),
            Err(err) => Status::from(err),
        }
    }
}

impl From<&SessionError> for Status {
    fn from(err: &SessionError) -> Self {
        Status::error(err.to_string())
    }
}

/// Outcomes that know how to describe themselves in a status line
pub trait Describe {
    /// Status text for this outcome
    fn describe(&self) -> Status;
}

impl Describe for ConnectOutcome {
    fn describe(&self) -> Status {
        match self {
            ConnectOutcome::Connected(identity) => {
                Status::success(format!("Connected as {}", identity_label(identity)))
            }
            ConnectOutcome::AlreadyConnected => Status::info("Already connected"),
        }
    }
}

impl Describe for DisconnectOutcome {
    fn describe(&self) -> Status {
        match self {
            DisconnectOutcome::Disconnected => Status::info("Disconnected"),
            DisconnectOutcome::NotConnected => Status::info("Not connected"),
        }
    }
}

impl Describe for ConversationListing {
    fn describe(&self) -> Status {
        if self.is_empty() {
            Status::info("No dialogs found")
        } else {
            Status::success(format!(
                "Found {} dialogs ({} channels, {} groups)",
                self.summaries.len(),
                self.channel_count,
                self.group_count
            ))
        }
    }
}

impl Describe for Selection {
    fn describe(&self) -> Status {
        Status::success(format!("Selected: {}", self.title))
    }
}

impl Describe for ListenOutcome {
    fn describe(&self) -> Status {
        match self {
            ListenOutcome::Started => Status::info("Listening for new messages..."),
            ListenOutcome::AlreadyListening => Status::info("Already listening"),
            ListenOutcome::Stopped => Status::info("Stopped listening"),
            ListenOutcome::NotListening => Status::info("Not listening"),
        }
    }
}

impl Describe for SendReceipt {
    fn describe(&self) -> Status {
        Status::success(format!("Message sent successfully to {}", self.target))
    }
}

impl Describe for SessionUpdate {
    fn describe(&self) -> Status {
        match self {
            SessionUpdate::MessageReceived { total, .. } => {
                Status::success(format!("Listening... (received {} messages)", total))
            }
            SessionUpdate::ListenerClosed => Status::info("Message stream closed by the library"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Identity, RemoteConversation};

    #[test]
    fn test_listing_status() {
        let empty = ConversationListing::default();
        assert_eq!(empty.describe(), Status::info("No dialogs found"));

        let records = vec![
            RemoteConversation {
                id: 1,
                broadcast: true,
                ..Default::default()
            },
            RemoteConversation {
                id: 2,
                megagroup: true,
                ..Default::default()
            },
        ];
        let listing = ConversationListing::from_remote(&records);
        assert_eq!(
            listing.describe(),
            Status::success("Found 2 dialogs (1 channels, 1 groups)")
        );
    }

    #[test]
    fn test_errors_project_to_error_level() {
        let result: Result<SendReceipt, SessionError> = Err(SessionError::NotConnected);
        let status = Status::of(&result);
        assert_eq!(status.level, Severity::Error);
        assert_eq!(status.message, "Please connect first");
    }

    #[test]
    fn test_connect_status() {
        let outcome = ConnectOutcome::Connected(Identity {
            first_name: Some("Ada".to_string()),
            username: None,
        });
        assert_eq!(
            outcome.describe(),
            Status::success("Connected as Ada (@no username)")
        );
    }

    #[test]
    fn test_pending_statuses_are_info() {
        for region in [
            StatusRegion::Connection,
            StatusRegion::Dialogs,
            StatusRegion::Messages,
            StatusRegion::Send,
        ] {
            assert_eq!(region.pending().level, Severity::Info);
        }
    }
}
