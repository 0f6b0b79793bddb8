//! Derived session status.

use serde::{Deserialize, Serialize};

/// Placeholder used when no live handle reports a protocol version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Point-in-time view of the session, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connected: bool,
    pub connecting: bool,
    pub server: Option<String>,
    pub identity: Option<String>,
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusSnapshot {
    /// Snapshot of a controller with nothing going on.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            connected: false,
            connecting: false,
            server: None,
            identity: None,
            protocol_version: UNKNOWN_VERSION.to_string(),
            error: None,
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_omitted_when_absent() {
        let json = serde_json::to_string(&StatusSnapshot::idle()).unwrap();
        assert!(json.contains("\"protocolVersion\":\"unknown\""));
        assert!(!json.contains("error"));
    }
}
