//! Session state
//!
//! Everything the orchestrator knows about the current session. One instance
//! per orchestrator; nothing survives the orchestrator.

use super::models::{ConversationSummary, IncomingMessageView, Selection};
use crate::library::{Identity, MessagingClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No client
    #[default]
    Disconnected,
    /// A connect call is in flight
    Connecting,
    /// Client connected and identity confirmed
    Connected,
}

/// Live-message listening flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ListeningState {
    /// No subscription
    #[default]
    Idle,
    /// Subscription active
    Listening,
}

/// Mutable session state owned by one orchestrator
#[derive(Default)]
pub struct SessionState {
    /// Connection lifecycle
    pub connection: ConnectionState,
    /// Listening flag
    pub listening: ListeningState,
    /// The live client handle, present only while Connected
    pub client: Option<Arc<dyn MessagingClient>>,
    /// Identity confirmed by the last successful connect
    pub identity: Option<Identity>,
    /// Currently selected send target
    pub selected: Option<Selection>,
    /// Last fetched conversation list
    pub conversations: Vec<ConversationSummary>,
    /// Received messages, most recent first
    pub feed: Vec<IncomingMessageView>,
    /// Task consuming the active subscription
    pub listener: Option<JoinHandle<()>>,
    /// Bumped by every connect and every reset; a connect installs its client
    /// only if the value is still the one it started with
    pub connect_attempt: u64,
}

impl SessionState {
    /// The client, if connected
    pub fn connected_client(&self) -> Option<Arc<dyn MessagingClient>> {
        match self.connection {
            ConnectionState::Connected => self.client.clone(),
            _ => None,
        }
    }

    /// Cancel the listener task, if any, and mark Idle
    ///
    /// Returns true if listening was active.
    pub fn stop_listener(&mut self) -> bool {
        let was_listening = self.listening == ListeningState::Listening;
        self.listening = ListeningState::Idle;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        was_listening
    }

    /// Start a connect attempt; returns its number
    pub fn begin_connect(&mut self) -> u64 {
        self.connection = ConnectionState::Connecting;
        self.connect_attempt += 1;
        self.connect_attempt
    }

    /// True while `attempt` is the connect in flight
    pub fn is_current_attempt(&self, attempt: u64) -> bool {
        self.connection == ConnectionState::Connecting && self.connect_attempt == attempt
    }

    /// Drop the client and everything tied to it; returns the handle for release
    ///
    /// A connect still in flight is cancelled.
    pub fn reset_connection(&mut self) -> Option<Arc<dyn MessagingClient>> {
        self.connect_attempt += 1;
        self.stop_listener();
        self.connection = ConnectionState::Disconnected;
        self.identity = None;
        self.client.take()
    }

    /// Record a received message at the top of the feed; returns the feed size
    pub fn push_message(&mut self, message: IncomingMessageView) -> usize {
        self.feed.insert(0, message);
        self.feed.len()
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("connection", &self.connection)
            .field("listening", &self.listening)
            .field("has_client", &self.client.is_some())
            .field("identity", &self.identity)
            .field("selected", &self.selected)
            .field("conversations", &self.conversations.len())
            .field("feed", &self.feed.len())
            .field("connect_attempt", &self.connect_attempt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = SessionState::default();
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert_eq!(state.listening, ListeningState::Idle);
        assert!(state.connected_client().is_none());
    }

    #[test]
    fn test_feed_is_most_recent_first() {
        let mut state = SessionState::default();
        let first = IncomingMessageView::new(None, None, "first", 1);
        let second = IncomingMessageView::new(None, None, "second", 2);
        assert_eq!(state.push_message(first), 1);
        assert_eq!(state.push_message(second), 2);
        assert_eq!(state.feed[0].text, "second");
        assert_eq!(state.feed[1].text, "first");
    }

    #[test]
    fn test_stop_listener_reports_previous_state() {
        let mut state = SessionState::default();
        assert!(!state.stop_listener());
        state.listening = ListeningState::Listening;
        assert!(state.stop_listener());
        assert_eq!(state.listening, ListeningState::Idle);
    }

    #[test]
    fn test_reset_cancels_connect_attempt() {
        let mut state = SessionState::default();
        let first = state.begin_connect();
        assert!(state.is_current_attempt(first));

        assert!(state.reset_connection().is_none());
        assert!(!state.is_current_attempt(first));

        let second = state.begin_connect();
        assert!(state.is_current_attempt(second));
        assert!(!state.is_current_attempt(first));
    }
}
