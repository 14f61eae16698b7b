//! Messaging library capability
//!
//! The orchestrator never talks to Telegram itself. It receives an object
//! implementing [`MessagingLibrary`] and drives clients created from it.
//! Connection handling, encryption and reconnection all live behind these
//! traits.

pub mod error;
pub mod readiness;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use error::LibraryError;
pub use readiness::{wait_for_library, LibraryGate, LibraryProbe};

/// Credentials used to construct a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Numeric application id
    pub app_id: i32,
    /// Application secret (api hash)
    pub app_secret: String,
    /// Serialized session string
    pub session_token: String,
}

/// Options handed to the library when constructing a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Reconnection attempts performed by the library itself
    pub reconnect_retries: u32,
}

/// The authenticated identity returned by the liveness check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// First name of the account, if any
    pub first_name: Option<String>,
    /// Public username of the account, if any
    pub username: Option<String>,
}

/// A conversation record as reported by the library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConversation {
    /// Numeric peer id
    pub id: i64,
    /// Title for channels and groups
    pub title: Option<String>,
    /// First name for direct chats
    pub first_name: Option<String>,
    /// Public username, if any
    pub username: Option<String>,
    /// Member count when the library knows it
    pub participants_count: Option<u32>,
    /// Broadcast channel flag
    pub broadcast: bool,
    /// Megagroup (supergroup) flag
    pub megagroup: bool,
    /// Entity class name (`User`, `Chat`, `Channel`)
    pub kind_tag: String,
}

/// A sender or chat entity resolved from a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerInfo {
    /// First name for users
    pub first_name: Option<String>,
    /// Title for chats and channels
    pub title: Option<String>,
}

/// A pushed "new message" event
///
/// Sender and chat are resolved lazily, each resolution may hit the network.
#[async_trait]
pub trait IncomingMessage: Send + Sync {
    /// Message date in epoch seconds
    fn date(&self) -> i64;

    /// Message text, empty for media-only messages
    fn text(&self) -> &str;

    /// Resolve the sender entity
    async fn sender(&self) -> Result<Option<PeerInfo>, LibraryError>;

    /// Resolve the chat entity
    async fn chat(&self) -> Result<Option<PeerInfo>, LibraryError>;
}

/// Boxed message event as delivered through a subscription
pub type MessageEvent = Box<dyn IncomingMessage>;

/// A live new-message subscription
///
/// Dropping the subscription is the cancellation mechanism: the receiving
/// half closes and the library stops delivering, and the optional release
/// hook tells the library to unregister its handler.
pub struct MessageSubscription {
    events: mpsc::Receiver<MessageEvent>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl MessageSubscription {
    /// Wrap an event receiver
    pub fn new(events: mpsc::Receiver<MessageEvent>) -> Self {
        Self {
            events,
            on_release: None,
        }
    }

    /// Attach a hook that runs once when the subscription is dropped
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_release = Some(Box::new(release));
        self
    }

    /// Wait for the next event; `None` once the library closes the stream
    pub async fn next(&mut self) -> Option<MessageEvent> {
        self.events.recv().await
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for MessageSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSubscription")
            .field("has_release_hook", &self.on_release.is_some())
            .finish()
    }
}

/// A client instance created by the library
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Open the connection
    async fn connect(&self) -> Result<(), LibraryError>;

    /// Fetch the authenticated identity
    async fn get_identity(&self) -> Result<Identity, LibraryError>;

    /// Fetch up to `limit` conversations
    async fn list_conversations(&self, limit: usize)
        -> Result<Vec<RemoteConversation>, LibraryError>;

    /// Register for new-message events
    async fn subscribe_new_messages(&self) -> Result<MessageSubscription, LibraryError>;

    /// Send a text message to a username or numeric id
    async fn send_message(&self, target: &str, text: &str) -> Result<(), LibraryError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), LibraryError>;
}

/// The loaded library: a factory for clients
#[async_trait]
pub trait MessagingLibrary: Send + Sync {
    /// Construct a client from credentials; does not connect
    async fn create_client(
        &self,
        credentials: &Credentials,
        options: ClientOptions,
    ) -> Result<Arc<dyn MessagingClient>, LibraryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_remote_conversation_deserializes_partial_records() {
        let json = r#"{"id": 42, "title": "News", "broadcast": true, "kindTag": "Channel"}"#;
        let record: RemoteConversation = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(record.title.as_deref(), Some("News"));
        assert!(record.broadcast);
        assert!(!record.megagroup);
        assert_eq!(record.participants_count, None);
        assert_eq!(record.kind_tag, "Channel");
    }

    #[tokio::test]
    async fn test_subscription_release_runs_once_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let (_tx, rx) = mpsc::channel(1);
        let flag = released.clone();
        let subscription = MessageSubscription::new(rx).with_release(move || {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!released.load(Ordering::SeqCst));
        drop(subscription);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_subscription_closes_sender() {
        let (tx, rx) = mpsc::channel::<MessageEvent>(1);
        let subscription = MessageSubscription::new(rx);
        drop(subscription);
        assert!(tx.is_closed());
    }
}
