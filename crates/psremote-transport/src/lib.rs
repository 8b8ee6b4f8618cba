//! Transport layer between an explorer UI and the session manager.
//!
//! Provides:
//! - Wire protocol (tagged JSON requests and replies)
//! - WebSocket transport (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientMessage, ServerMessage};
