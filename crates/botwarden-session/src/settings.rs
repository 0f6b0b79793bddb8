//! Controller tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default keep-alive period in milliseconds.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 30_000;
/// Default bound of the random look offset, in radians.
pub const DEFAULT_KEEP_ALIVE_JITTER: f32 = 0.1;
/// Default first reconnect delay in milliseconds.
pub const DEFAULT_BACKOFF_FLOOR_MS: u64 = 5_000;
/// Default maximum reconnect delay in milliseconds.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;
/// Default prefix marking outgoing text as a command.
pub const DEFAULT_COMMAND_PREFIX: &str = "/";

/// Configuration for [`SessionController`](crate::SessionController).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettings {
    /// Keep-alive period in ms (default: 30000).
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
    /// Look offset bound per keep-alive tick (default: 0.1).
    #[serde(default = "default_keep_alive_jitter")]
    pub keep_alive_jitter: f32,
    /// First reconnect delay in ms (default: 5000).
    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,
    /// Reconnect delay cap in ms (default: 60000).
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Outgoing text starting with this is logged as a command (default: "/").
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Schedule reconnection on `error` instead of waiting for `end` (default: false).
    #[serde(default)]
    pub reconnect_on_error: bool,
}

fn default_keep_alive_interval_ms() -> u64 {
    DEFAULT_KEEP_ALIVE_INTERVAL_MS
}
fn default_keep_alive_jitter() -> f32 {
    DEFAULT_KEEP_ALIVE_JITTER
}
fn default_backoff_floor_ms() -> u64 {
    DEFAULT_BACKOFF_FLOOR_MS
}
fn default_backoff_cap_ms() -> u64 {
    DEFAULT_BACKOFF_CAP_MS
}
fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: DEFAULT_KEEP_ALIVE_INTERVAL_MS,
            keep_alive_jitter: DEFAULT_KEEP_ALIVE_JITTER,
            backoff_floor_ms: DEFAULT_BACKOFF_FLOOR_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            command_prefix: default_command_prefix(),
            reconnect_on_error: false,
        }
    }
}

impl ControllerSettings {
    /// Keep-alive period; never zero.
    #[must_use]
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms.max(1))
    }

    #[must_use]
    pub const fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff_floor_ms)
    }

    #[must_use]
    pub const fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    /// Whether outgoing text is a command rather than a chat message.
    #[must_use]
    pub fn is_command(&self, text: &str) -> bool {
        !self.command_prefix.is_empty() && text.starts_with(&self.command_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: ControllerSettings =
            serde_json::from_str(r#"{"backoffFloorMs":10000}"#).unwrap();
        assert_eq!(settings.backoff_floor(), Duration::from_secs(10));
        assert_eq!(settings.backoff_cap(), Duration::from_secs(60));
        assert_eq!(settings.keep_alive_interval(), Duration::from_secs(30));
        assert!(!settings.reconnect_on_error);
    }

    #[test]
    fn test_command_classification() {
        let settings = ControllerSettings::default();
        assert!(settings.is_command("/spawn"));
        assert!(!settings.is_command("hello /spawn"));
    }
}
