//! Session lifecycle for unattended game agents.
//!
//! Provides:
//! - `SessionController` - Connect/stop/send state machine with keep-alive
//! - `Backoff` - Doubling reconnect delay with floor and cap
//! - `ControllerSettings` - Timer and policy configuration

pub mod backoff;
pub mod controller;
mod keep_alive;
pub mod settings;

pub use backoff::Backoff;
pub use controller::{SessionController, SessionError, SessionState};
pub use settings::ControllerSettings;
