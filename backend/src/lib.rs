//! Telegram Session Backend Library
//!
//! Session orchestration for the Telegram test client: the messaging library
//! capability, the GramJS bridge that implements it, and the orchestrator the
//! GUI drives.

pub mod bridge;
pub mod config;
pub mod error;
pub mod library;
pub mod session;

pub use error::SessionError;
