//! Transport layer for remote observers and controllers.
//!
//! Provides:
//! - Wire protocol (JSON `{type, data}` envelopes)
//! - Observer feed bridging the event log and status updates to a channel
//! - WebSocket transport (feature: websocket)

pub mod feed;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use feed::{ObserverFeed, ObserverState};
pub use protocol::{ClientMessage, ServerMessage};
