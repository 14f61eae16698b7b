//! GramJS capability backed by the bridge process
//!
//! Implements the library traits on top of [`BridgeSession`] requests.

use super::protocol::{ops, WireMessage};
use super::session::BridgeSession;
use crate::library::{
    ClientOptions, Credentials, Identity, IncomingMessage, LibraryError, LibraryProbe,
    MessageEvent, MessageSubscription, MessagingClient, MessagingLibrary, PeerInfo,
    RemoteConversation,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Presence probe: the library is available once the bridge reports ready
pub struct BridgeProbe {
    session: Arc<BridgeSession>,
}

impl BridgeProbe {
    /// Probe a bridge session
    pub fn new(session: Arc<BridgeSession>) -> Self {
        Self { session }
    }
}

impl LibraryProbe for BridgeProbe {
    fn probe(&self) -> Option<Arc<dyn MessagingLibrary>> {
        if self.session.is_ready() {
            Some(Arc::new(BridgeLibrary::new(self.session.clone())))
        } else {
            None
        }
    }
}

/// GramJS, as hosted by the bridge
pub struct BridgeLibrary {
    session: Arc<BridgeSession>,
}

impl BridgeLibrary {
    /// Wrap a bridge session
    pub fn new(session: Arc<BridgeSession>) -> Self {
        Self { session }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedClient {
    client_id: String,
}

#[async_trait]
impl MessagingLibrary for BridgeLibrary {
    async fn create_client(
        &self,
        credentials: &Credentials,
        options: ClientOptions,
    ) -> Result<Arc<dyn MessagingClient>, LibraryError> {
        let created: CreatedClient = self
            .session
            .request_as(
                ops::CREATE_CLIENT,
                params(json!({
                    "session": credentials.session_token,
                    "apiId": credentials.app_id,
                    "apiHash": credentials.app_secret,
                    "connectionRetries": options.reconnect_retries,
                })),
            )
            .await?;

        debug!(client_id = %created.client_id, "Bridge client created");

        Ok(Arc::new(BridgeClient {
            session: self.session.clone(),
            client_id: created.client_id,
        }))
    }
}

/// A GramJS `TelegramClient` living inside the bridge
pub struct BridgeClient {
    session: Arc<BridgeSession>,
    client_id: String,
}

impl BridgeClient {
    fn with_client(&self, extra: Value) -> Map<String, Value> {
        let mut map = params(extra);
        map.insert("clientId".to_string(), Value::String(self.client_id.clone()));
        map
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    async fn connect(&self) -> Result<(), LibraryError> {
        self.session
            .request(ops::CONNECT, self.with_client(Value::Null))
            .await?;
        Ok(())
    }

    async fn get_identity(&self) -> Result<Identity, LibraryError> {
        self.session
            .request_as(ops::GET_ME, self.with_client(Value::Null))
            .await
    }

    async fn list_conversations(
        &self,
        limit: usize,
    ) -> Result<Vec<RemoteConversation>, LibraryError> {
        self.session
            .request_as(ops::GET_DIALOGS, self.with_client(json!({ "limit": limit })))
            .await
    }

    async fn subscribe_new_messages(&self) -> Result<MessageSubscription, LibraryError> {
        // The bridge may push events before it answers, so route them first.
        let subscription_id = Uuid::new_v4().to_string();
        let mut wire = self.session.register_subscription(&subscription_id).await;

        let request = self.with_client(json!({ "subscriptionId": subscription_id }));
        if let Err(e) = self.session.request(ops::SUBSCRIBE, request).await {
            self.session.unregister_subscription(&subscription_id).await;
            return Err(e);
        }

        let (tx, rx) = mpsc::channel::<MessageEvent>(16);

        let session = self.session.clone();
        let client_id = self.client_id.clone();
        tokio::spawn(async move {
            while let Some(message) = wire.recv().await {
                let event = Box::new(BridgeMessage {
                    session: session.clone(),
                    client_id: client_id.clone(),
                    message,
                });
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        info!(subscription_id = %subscription_id, "Subscribed to new messages");

        let session = self.session.clone();
        let client_id = self.client_id.clone();
        Ok(MessageSubscription::new(rx).with_release(move || {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                return;
            };
            handle.spawn(async move {
                session.unregister_subscription(&subscription_id).await;
                let request = params(json!({
                    "clientId": client_id,
                    "subscriptionId": subscription_id,
                }));
                if let Err(e) = session.request(ops::UNSUBSCRIBE, request).await {
                    warn!(error = %e, "Failed to unregister bridge subscription");
                }
            });
        }))
    }

    async fn send_message(&self, target: &str, text: &str) -> Result<(), LibraryError> {
        self.session
            .request(
                ops::SEND_MESSAGE,
                self.with_client(json!({ "target": target, "message": text })),
            )
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LibraryError> {
        self.session
            .request(ops::DISCONNECT, self.with_client(Value::Null))
            .await?;
        Ok(())
    }
}

/// A pushed message whose peers are resolved through the bridge on demand
struct BridgeMessage {
    session: Arc<BridgeSession>,
    client_id: String,
    message: WireMessage,
}

impl BridgeMessage {
    async fn resolve(&self, peer: Option<&str>) -> Result<Option<PeerInfo>, LibraryError> {
        let Some(peer) = peer else {
            return Ok(None);
        };
        self.session
            .request_as(
                ops::GET_ENTITY,
                params(json!({ "clientId": self.client_id, "peer": peer })),
            )
            .await
    }
}

#[async_trait]
impl IncomingMessage for BridgeMessage {
    fn date(&self) -> i64 {
        self.message.date
    }

    fn text(&self) -> &str {
        &self.message.text
    }

    async fn sender(&self) -> Result<Option<PeerInfo>, LibraryError> {
        self.resolve(self.message.sender_id.as_deref()).await
    }

    async fn chat(&self) -> Result<Option<PeerInfo>, LibraryError> {
        self.resolve(self.message.chat_id.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Answers every request from a fixed script, echoing ids
    async fn scripted_bridge(
        requests: DuplexStream,
        mut responses: DuplexStream,
        script: Vec<(&'static str, Value)>,
    ) {
        responses.write_all(b"{\"event\":\"ready\"}\n").await.unwrap();
        let mut lines = BufReader::new(requests).lines();
        for (expected_type, data) in script {
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["type"], expected_type);
            let reply = json!({"id": request["id"], "status": "success", "data": data});
            responses
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
        }
    }

    fn bridge_session() -> (Arc<BridgeSession>, DuplexStream, DuplexStream) {
        let (to_bridge, bridge_in) = duplex(8192);
        let (bridge_out, from_bridge) = duplex(8192);
        let session =
            BridgeSession::from_transport(from_bridge, to_bridge, Duration::from_secs(5));
        (session, bridge_in, bridge_out)
    }

    async fn wait_ready(probe: &BridgeProbe) -> Arc<dyn MessagingLibrary> {
        for _ in 0..100 {
            if let Some(library) = probe.probe() {
                return library;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("bridge never became ready");
    }

    #[tokio::test]
    async fn test_events_pushed_with_subscribe_reply_are_delivered() {
        let (session, bridge_in, mut bridge_out) = bridge_session();
        let client = BridgeClient {
            session,
            client_id: "c1".to_string(),
        };

        let bridge = tokio::spawn(async move {
            let mut lines = BufReader::new(bridge_in).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["type"], "subscribe");
            assert_eq!(request["clientId"], "c1");
            let subscription_id = request["subscriptionId"].as_str().unwrap().to_string();

            // Events race the reply, as they do when a busy chat is open.
            let mut burst = String::new();
            for n in 0..100 {
                let event = json!({
                    "event": "new_message",
                    "subscription": subscription_id,
                    "message": {
                        "date": 1_700_000_000 + n,
                        "text": format!("m{}", n),
                        "senderId": "7"
                    }
                });
                burst.push_str(&format!("{}\n", event));
            }
            let reply = json!({
                "id": request["id"],
                "status": "success",
                "data": {"subscriptionId": subscription_id}
            });
            burst.push_str(&format!("{}\n", reply));
            bridge_out.write_all(burst.as_bytes()).await.unwrap();

            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["type"], "get_entity");
            assert_eq!(request["peer"], "7");
            let reply = json!({
                "id": request["id"],
                "status": "success",
                "data": {"firstName": "Bob"}
            });
            bridge_out
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
            (lines, bridge_out)
        });

        let wait = Duration::from_secs(2);
        let mut subscription = tokio::time::timeout(wait, client.subscribe_new_messages())
            .await
            .unwrap()
            .unwrap();

        let first = tokio::time::timeout(wait, subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.text(), "m0");
        let sender = tokio::time::timeout(wait, first.sender())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sender.and_then(|p| p.first_name).as_deref(), Some("Bob"));

        for n in 1..100 {
            let message = tokio::time::timeout(wait, subscription.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message.text(), format!("m{}", n));
        }

        let (_lines, _bridge_out) = bridge.await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_absent_until_ready() {
        let (session, _bridge_in, _bridge_out) = bridge_session();
        let probe = BridgeProbe::new(session);
        assert!(probe.probe().is_none());
    }

    #[tokio::test]
    async fn test_client_lifecycle_over_bridge() {
        let (session, bridge_in, bridge_out) = bridge_session();
        let bridge = tokio::spawn(scripted_bridge(
            bridge_in,
            bridge_out,
            vec![
                ("create_client", json!({"clientId": "c1"})),
                ("connect", Value::Null),
                ("get_me", json!({"firstName": "Ada", "username": "ada"})),
                (
                    "get_dialogs",
                    json!([
                        {"id": 1, "title": "News", "broadcast": true, "kindTag": "Channel"},
                        {"id": 2, "firstName": "Bob", "kindTag": "User"}
                    ]),
                ),
                ("send_message", Value::Null),
            ],
        ));

        let probe = BridgeProbe::new(session);
        let library = wait_ready(&probe).await;
        let credentials = Credentials {
            app_id: 12345,
            app_secret: "abc".to_string(),
            session_token: "sess1".to_string(),
        };
        let client = library
            .create_client(&credentials, ClientOptions { reconnect_retries: 5 })
            .await
            .unwrap();

        client.connect().await.unwrap();
        let me = client.get_identity().await.unwrap();
        assert_eq!(me.first_name.as_deref(), Some("Ada"));
        assert_eq!(me.username.as_deref(), Some("ada"));

        let dialogs = client.list_conversations(100).await.unwrap();
        assert_eq!(dialogs.len(), 2);
        assert!(dialogs[0].broadcast);
        assert_eq!(dialogs[1].first_name.as_deref(), Some("Bob"));

        client.send_message("@bob", "hello").await.unwrap();
        bridge.await.unwrap();
    }
}
