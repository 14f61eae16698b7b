//! Bridge wire protocol
//!
//! Newline-delimited JSON over the bridge process's stdin/stdout. Requests
//! carry a unique `id` that the matching response echoes back; events are
//! pushed unsolicited and are distinguished by an `event` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request sent to the bridge process
#[derive(Debug, Serialize)]
pub struct BridgeRequest {
    /// Correlation id echoed by the response
    pub id: String,
    /// Operation name
    #[serde(rename = "type")]
    pub request_type: String,
    /// Operation parameters, flattened into the request object
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Response received from the bridge process
#[derive(Debug, Deserialize)]
pub struct BridgeResponse {
    /// Correlation id of the originating request
    pub id: String,
    /// `success` or `error`
    pub status: String,
    /// Response payload (for success)
    #[serde(default)]
    pub data: Option<Value>,
    /// Error message (for error)
    #[serde(default)]
    pub message: Option<String>,
}

/// A new-message event as serialized by the bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireMessage {
    /// Message date in epoch seconds
    pub date: i64,
    /// Message text
    pub text: String,
    /// Sender peer id, resolvable with `get_entity`
    pub sender_id: Option<String>,
    /// Chat peer id, resolvable with `get_entity`
    pub chat_id: Option<String>,
}

/// Unsolicited event pushed by the bridge
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// The GramJS library finished loading
    Ready,
    /// A new message arrived for a subscription
    NewMessage {
        /// Subscription the message belongs to
        subscription: String,
        /// The message itself
        message: WireMessage,
    },
}

/// Any line the bridge may write to stdout
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BridgeLine {
    /// Pushed event
    Event(BridgeEvent),
    /// Response to a request
    Response(BridgeResponse),
}

impl BridgeLine {
    /// Parse one stdout line
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Bridge operation names
pub mod ops {
    /// Construct a client from a session string
    pub const CREATE_CLIENT: &str = "create_client";
    /// Connect a client
    pub const CONNECT: &str = "connect";
    /// Fetch the authenticated user
    pub const GET_ME: &str = "get_me";
    /// Fetch dialogs
    pub const GET_DIALOGS: &str = "get_dialogs";
    /// Register a new-message handler
    pub const SUBSCRIBE: &str = "subscribe";
    /// Remove a new-message handler
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Resolve a peer id to an entity
    pub const GET_ENTITY: &str = "get_entity";
    /// Send a text message
    pub const SEND_MESSAGE: &str = "send_message";
    /// Disconnect a client
    pub const DISCONNECT: &str = "disconnect";
}
