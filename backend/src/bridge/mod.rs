//! GramJS bridge
//!
//! GramJS runs inside a persistent Node.js sidecar. This module spawns it,
//! speaks its JSON-lines protocol and exposes it as a
//! [`MessagingLibrary`](crate::library::MessagingLibrary).

pub mod client;
pub mod protocol;
pub mod session;

pub use client::{BridgeClient, BridgeLibrary, BridgeProbe};
pub use session::BridgeSession;
