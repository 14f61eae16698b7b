//! Session module
//!
//! The orchestrator, its state, and the projections it hands to the view.

pub mod models;
pub mod orchestrator;
pub mod state;
pub mod status;

pub use models::{
    ConversationKind, ConversationListing, ConversationSummary, IncomingMessageView, Selection,
    SendReceipt,
};
pub use orchestrator::{
    ConnectOutcome, DisconnectOutcome, ListenOutcome, Orchestrator, SessionUpdate,
};
pub use state::{ConnectionState, ListeningState};
pub use status::{Describe, Severity, Status, StatusRegion};
