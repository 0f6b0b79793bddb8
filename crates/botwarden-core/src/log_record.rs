//! Structured log records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What produced a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// Inbound in-game chat.
    Chat,
    /// Local controller activity.
    Console,
    /// Remote server lifecycle.
    Server,
    /// Authentication flow prompts.
    Auth,
    /// Failures.
    Error,
}

impl LogCategory {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Console => "console",
            Self::Server => "server",
            Self::Auth => "auth",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable log record.
///
/// `message` is always sanitized before a record is constructed by the
/// [`EventLog`](crate::EventLog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub category: LogCategory,
    pub message: String,
    pub severity: Severity,
}

impl LogRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn now(category: LogCategory, message: String, severity: Severity) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            message,
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_shape() {
        let record = LogRecord::now(LogCategory::Server, "up".to_string(), Severity::Success);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["category"], "server");
        assert_eq!(json["severity"], "success");
        assert_eq!(json["message"], "up");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
