//! Core abstractions for unattended game sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `EventLog` - Bounded backlog + ordered subscriber fan-out
//! - `LogRecord` - Sanitized, categorized log entry
//! - `SessionConfig` / `StatusSnapshot` - Session data model
//! - `GameClient` / `GameHandle` - Boundary with the game-protocol client

pub mod config;
pub mod event_log;
pub mod log_record;
pub mod sanitize;
pub mod status;
pub mod traits;

pub use config::{AuthMode, ConfigError, SessionConfig};
pub use event_log::{EventLog, LogSubscriber, SubscriptionId};
pub use log_record::{LogCategory, LogRecord, Severity};
pub use status::StatusSnapshot;
pub use traits::{ClientError, EventSink, GameClient, GameHandle, SessionEvent, TaggedEvent};
