//! Session Orchestrator
//!
//! Drives one messaging client on behalf of the view: connect, list
//! conversations, select a target, listen for new messages, send, disconnect.
//!
//! Every operation checks its preconditions up front and fails for that call
//! only; nothing is retried here. Session state is shared behind a lock that
//! is never held across a library call, so a slow fetch does not hold up a
//! send.

use super::models::{
    ConversationListing, ConversationSummary, IncomingMessageView, Selection, SendReceipt,
};
use super::state::{ConnectionState, ListeningState, SessionState};
use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::library::{
    ClientOptions, Credentials, Identity, IncomingMessage, LibraryGate, MessageSubscription,
    MessagingLibrary,
};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Reported by a connect that a disconnect overtook
const CONNECT_CANCELLED: &str = "cancelled by disconnect";

/// Result of a connect call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Connected; the confirmed identity
    Connected(Identity),
    /// A client was already connected or connecting; nothing changed
    AlreadyConnected,
}

/// Result of a disconnect call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The client was released
    Disconnected,
    /// There was no client to release
    NotConnected,
}

/// Result of start/stop listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Subscription registered
    Started,
    /// Start while already listening; no-op
    AlreadyListening,
    /// Subscription cancelled
    Stopped,
    /// Stop while idle; no-op
    NotListening,
}

/// Pushed to the view outside of any user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A new message was projected into the feed
    MessageReceived {
        /// The projected message
        message: IncomingMessageView,
        /// Feed size after insertion
        total: usize,
    },
    /// The library ended the subscription on its own
    ListenerClosed,
}

/// Orchestrates a single messaging session
pub struct Orchestrator {
    library: Arc<dyn MessagingLibrary>,
    config: ClientConfig,
    state: Arc<RwLock<SessionState>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl Orchestrator {
    /// Create an orchestrator over an already-resolved library
    ///
    /// Returns the orchestrator and the stream of pushed updates for the view.
    pub fn new(
        library: Arc<dyn MessagingLibrary>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            library,
            config,
            state: Arc::new(RwLock::new(SessionState::default())),
            updates,
        };
        (orchestrator, rx)
    }

    /// Wait for the library behind `gate`, then create an orchestrator
    pub async fn bootstrap(
        gate: &LibraryGate,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionUpdate>), SessionError> {
        let library = gate.ready().await?;
        Ok(Self::new(library, config))
    }

    /// Connect with the given credentials and confirm the identity
    pub async fn connect(
        &self,
        app_id: i32,
        app_secret: &str,
        session_token: &str,
    ) -> Result<ConnectOutcome, SessionError> {
        let credentials = validate_credentials(app_id, app_secret, session_token)?;

        let attempt = {
            let mut state = self.state.write().await;
            if state.connection != ConnectionState::Disconnected {
                debug!(connection = ?state.connection, "Connect ignored, session already active");
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            state.begin_connect()
        };

        info!(app_id, attempt, "Connecting to Telegram");

        let options = ClientOptions {
            reconnect_retries: self.config.reconnect_retries,
        };

        let client = match self.library.create_client(&credentials, options).await {
            Ok(client) => client,
            Err(e) => return Err(self.fail_connect(attempt, e.to_string()).await),
        };

        if let Err(e) = client.connect().await {
            return Err(self.fail_connect(attempt, e.to_string()).await);
        }

        let identity = match client.get_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                // The handle is not kept, so release it here.
                if let Err(disconnect_err) = client.disconnect().await {
                    debug!(
                        error = %disconnect_err,
                        "Disconnect after failed identity check failed"
                    );
                }
                return Err(self.fail_connect(attempt, e.to_string()).await);
            }
        };

        let installed = {
            let mut state = self.state.write().await;
            if state.is_current_attempt(attempt) {
                state.connection = ConnectionState::Connected;
                state.client = Some(client.clone());
                state.identity = Some(identity.clone());
                true
            } else {
                false
            }
        };

        if !installed {
            info!(attempt, "Connect overtaken by disconnect, releasing client");
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "Disconnect of cancelled client failed");
            }
            return Err(SessionError::ConnectionFailed(CONNECT_CANCELLED.to_string()));
        }

        info!(
            first_name = ?identity.first_name,
            username = ?identity.username,
            "Connected"
        );

        Ok(ConnectOutcome::Connected(identity))
    }

    async fn fail_connect(&self, attempt: u64, message: String) -> SessionError {
        error!(error = %message, attempt, "Connection failed");
        let mut state = self.state.write().await;
        // A newer attempt owns the state now; leave it alone.
        if state.is_current_attempt(attempt) {
            state.connection = ConnectionState::Disconnected;
        }
        SessionError::ConnectionFailed(message)
    }

    /// Fetch one page of conversations, replacing the previous list
    pub async fn list_conversations(&self) -> Result<ConversationListing, SessionError> {
        let client = self
            .state
            .read()
            .await
            .connected_client()
            .ok_or(SessionError::NotConnected)?;

        debug!(limit = self.config.dialog_limit, "Fetching dialogs");

        let records = client
            .list_conversations(self.config.dialog_limit)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch dialogs");
                SessionError::FetchFailed(e.to_string())
            })?;

        let listing = ConversationListing::from_remote(&records);
        self.state.write().await.conversations = listing.summaries.clone();

        info!(
            dialogs = listing.summaries.len(),
            channels = listing.channel_count,
            groups = listing.group_count,
            "Dialogs fetched"
        );

        Ok(listing)
    }

    /// Record `summary` as the send target
    pub async fn select_conversation(&self, summary: &ConversationSummary) -> Selection {
        let selection = Selection::of(summary);
        debug!(target_id = selection.target_id, "Conversation selected");
        self.state.write().await.selected = Some(selection.clone());
        selection
    }

    /// Subscribe to new-message events
    pub async fn start_listening(&self) -> Result<ListenOutcome, SessionError> {
        let client = {
            let mut state = self.state.write().await;
            let client = state.connected_client().ok_or(SessionError::NotConnected)?;
            if state.listening == ListeningState::Listening {
                return Ok(ListenOutcome::AlreadyListening);
            }
            // Claim the flag now so a second start while subscribing is a no-op.
            state.listening = ListeningState::Listening;
            client
        };

        let subscription = match client.subscribe_new_messages().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, "Failed to start listening");
                self.state.write().await.listening = ListeningState::Idle;
                return Err(SessionError::ListenFailed(e.to_string()));
            }
        };

        let mut state = self.state.write().await;
        if state.listening != ListeningState::Listening {
            // Stopped or disconnected while the subscription was being set up.
            drop(subscription);
            return Ok(ListenOutcome::Stopped);
        }

        state.listener = Some(tokio::spawn(run_listener(
            subscription,
            self.state.clone(),
            self.updates.clone(),
        )));

        info!("Started listening for messages");
        Ok(ListenOutcome::Started)
    }

    /// Cancel the new-message subscription
    pub async fn stop_listening(&self) -> ListenOutcome {
        if self.state.write().await.stop_listener() {
            info!("Stopped listening for messages");
            ListenOutcome::Stopped
        } else {
            ListenOutcome::NotListening
        }
    }

    /// Send `text` to `target`, or to the selected conversation if `target` is blank
    pub async fn send_message(
        &self,
        target: &str,
        text: &str,
    ) -> Result<SendReceipt, SessionError> {
        let (client, selected) = {
            let state = self.state.read().await;
            let client = state.connected_client().ok_or(SessionError::NotConnected)?;
            (client, state.selected.as_ref().map(|s| s.target_id))
        };

        let target = match target.trim() {
            "" => selected.map(|id| id.to_string()).ok_or_else(|| {
                SessionError::InvalidInput("Please enter a target chat".to_string())
            })?,
            explicit => explicit.to_string(),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::InvalidInput("Please enter a message".to_string()));
        }

        client.send_message(&target, text).await.map_err(|e| {
            error!(chat_target = %target, error = %e, "Failed to send message");
            SessionError::SendFailed(e.to_string())
        })?;

        info!(chat_target = %target, text_len = text.len(), "Message sent");
        Ok(SendReceipt { target })
    }

    /// Release the client, if any, or cancel a connect in flight
    pub async fn disconnect(&self) -> DisconnectOutcome {
        let (client, was_connecting) = {
            let mut state = self.state.write().await;
            let was_connecting = state.connection == ConnectionState::Connecting;
            (state.reset_connection(), was_connecting)
        };

        match client {
            Some(client) => {
                if let Err(e) = client.disconnect().await {
                    warn!(error = %e, "Disconnect reported an error");
                }
                info!("Disconnected");
                DisconnectOutcome::Disconnected
            }
            None if was_connecting => {
                info!("Cancelled connect in flight");
                DisconnectOutcome::Disconnected
            }
            None => DisconnectOutcome::NotConnected,
        }
    }

    /// Best-effort release on exit
    pub async fn teardown(&self) {
        if self.disconnect().await == DisconnectOutcome::Disconnected {
            debug!("Client released during teardown");
        }
    }

    /// Current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    /// Current listening state
    pub async fn listening_state(&self) -> ListeningState {
        self.state.read().await.listening
    }

    /// Identity confirmed by the last connect
    pub async fn identity(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    /// Current selection
    pub async fn selection(&self) -> Option<Selection> {
        self.state.read().await.selected.clone()
    }

    /// Last fetched conversations
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.read().await.conversations.clone()
    }

    /// Received messages, most recent first
    pub async fn feed(&self) -> Vec<IncomingMessageView> {
        self.state.read().await.feed.clone()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_write() {
            state.stop_listener();
        }
    }
}

fn validate_credentials(
    app_id: i32,
    app_secret: &str,
    session_token: &str,
) -> Result<Credentials, SessionError> {
    if app_id == 0 || app_secret.trim().is_empty() {
        return Err(SessionError::InvalidCredentials(
            "Please enter API ID and API Hash".to_string(),
        ));
    }
    let session_token = session_token.trim();
    if session_token.is_empty() {
        return Err(SessionError::InvalidCredentials(
            "Please enter a session string".to_string(),
        ));
    }
    Ok(Credentials {
        app_id,
        app_secret: app_secret.trim().to_string(),
        session_token: session_token.to_string(),
    })
}

/// Consume the subscription until it ends or the task is aborted
async fn run_listener(
    mut subscription: MessageSubscription,
    state: Arc<RwLock<SessionState>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
) {
    while let Some(event) = subscription.next().await {
        let message = project_message(event.as_ref()).await;
        let total = state.write().await.push_message(message.clone());
        debug!(total, "New message");
        let _ = updates.send(SessionUpdate::MessageReceived { message, total });
    }

    warn!("Message subscription closed by the library");
    {
        let mut state = state.write().await;
        state.listening = ListeningState::Idle;
        state.listener = None;
    }
    let _ = updates.send(SessionUpdate::ListenerClosed);
}

/// Resolve sender and chat, falling back to "Unknown" on any failure
async fn project_message(event: &dyn IncomingMessage) -> IncomingMessageView {
    let sender = match event.sender().await {
        Ok(sender) => sender,
        Err(e) => {
            debug!(error = %e, "Sender resolution failed");
            None
        }
    };
    let chat = match event.chat().await {
        Ok(chat) => chat,
        Err(e) => {
            debug!(error = %e, "Chat resolution failed");
            None
        }
    };
    IncomingMessageView::new(sender.as_ref(), chat.as_ref(), event.text(), event.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credentials() {
        assert!(matches!(
            validate_credentials(0, "abc", "sess"),
            Err(SessionError::InvalidCredentials(_))
        ));
        assert!(matches!(
            validate_credentials(1, "  ", "sess"),
            Err(SessionError::InvalidCredentials(_))
        ));
        assert!(matches!(
            validate_credentials(1, "abc", "\n"),
            Err(SessionError::InvalidCredentials(_))
        ));

        let credentials = validate_credentials(12345, "abc", " sess1 ").unwrap();
        assert_eq!(credentials.session_token, "sess1");
    }
}
