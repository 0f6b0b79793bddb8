//! Session configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default game server port.
pub const DEFAULT_PORT: u16 = 25565;

/// Version string meaning "let the client negotiate".
pub const AUTO_VERSION: &str = "auto";

/// How the agent authenticates against the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Plain identity/password login.
    #[serde(alias = "offline")]
    Password,
    /// Account token obtained through an interactive device-code flow.
    #[default]
    #[serde(alias = "microsoft")]
    Token,
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Port must be between 1 and 65535")]
    InvalidPort,
    #[error("Host must not be empty")]
    EmptyHost,
    #[error("Identity must not be empty")]
    EmptyIdentity,
}

/// Connection parameters for one session.
///
/// Immutable once an attempt starts; every `start` replaces it wholesale
/// and automatic reconnection reuses it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Server hostname or address.
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Account identity (email or username).
    pub identity: String,

    /// Authentication mode.
    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Protocol version, or `"auto"` to negotiate.
    #[serde(default = "default_version")]
    pub protocol_version: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_version() -> String {
    AUTO_VERSION.to_string()
}

impl SessionConfig {
    /// Create a config with default port, auth mode and version.
    #[must_use]
    pub fn new(host: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            identity: identity.into(),
            auth_mode: AuthMode::default(),
            protocol_version: default_version(),
        }
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the authentication mode.
    #[must_use]
    pub const fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    /// Pin a protocol version.
    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// `host:port` as shown in status and log records.
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The version to request from the client, `None` for negotiation.
    #[must_use]
    pub fn requested_version(&self) -> Option<&str> {
        let version = self.protocol_version.trim();
        if version.is_empty() || version.eq_ignore_ascii_case(AUTO_VERSION) {
            None
        } else {
            Some(version)
        }
    }

    /// Check the config before an attempt is made.
    ///
    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.identity.trim().is_empty() {
            return Err(ConfigError::EmptyIdentity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"host":"s","identity":"u"}"#).unwrap();
        assert_eq!(config.port, 25565);
        assert_eq!(config.auth_mode, AuthMode::Token);
        assert_eq!(config.protocol_version, "auto");
        assert_eq!(config.requested_version(), None);
    }

    #[test]
    fn test_auth_aliases() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"host":"s","identity":"u","authMode":"microsoft","protocolVersion":"1.20.4"}"#,
        )
        .unwrap();
        assert_eq!(config.auth_mode, AuthMode::Token);
        assert_eq!(config.requested_version(), Some("1.20.4"));

        let offline: AuthMode = serde_json::from_str(r#""offline""#).unwrap();
        assert_eq!(offline, AuthMode::Password);
    }

    #[test]
    fn test_server_address() {
        let config = SessionConfig::new("play.example.com", "u").with_port(25566);
        assert_eq!(config.server_address(), "play.example.com:25566");
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::new("s", "u").validate().is_ok());
        assert_eq!(
            SessionConfig::new(" ", "u").validate(),
            Err(ConfigError::EmptyHost)
        );
        assert_eq!(
            SessionConfig::new("s", "u").with_port(0).validate(),
            Err(ConfigError::InvalidPort)
        );
        assert_eq!(
            SessionConfig::new("s", "").validate(),
            Err(ConfigError::EmptyIdentity)
        );
    }

    #[test]
    fn test_version_auto_is_case_insensitive() {
        let config = SessionConfig::new("s", "u").with_protocol_version("AUTO");
        assert_eq!(config.requested_version(), None);
    }
}
