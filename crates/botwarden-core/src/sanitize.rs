//! Credential masking for log messages.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement for masked credential values.
pub const MASK: &str = "[MASKED]";

/// Key, separator run, value. Only the value group is replaced.
static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(access_token|refresh_token)(['":=\s]*)([^,\s}'"]+)"#).unwrap()
});

/// Mask credential values and coerce the message into a single trimmed string.
#[must_use]
pub fn sanitize_message(message: &str) -> String {
    let masked = TOKEN_PATTERN.replace_all(message, |caps: &regex::Captures<'_>| {
        format!("{}{}{MASK}", &caps[1], &caps[2])
    });
    masked.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_value_keeps_key() {
        assert_eq!(
            sanitize_message("access_token: abcd1234"),
            "access_token: [MASKED]"
        );
    }

    #[test]
    fn test_masks_json_fields() {
        let out = sanitize_message(r#"{"access_token":"abc","refresh_token":"def","user":"x"}"#);
        assert!(!out.contains("abc"));
        assert!(!out.contains("def"));
        assert!(out.contains(r#""access_token":"[MASKED]""#));
        assert!(out.contains(r#""refresh_token":"[MASKED]""#));
        assert!(out.contains(r#""user":"x""#));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(sanitize_message("ACCESS_TOKEN=zzz"), "ACCESS_TOKEN=[MASKED]");
        assert_eq!(sanitize_message("Refresh_Token qqq"), "Refresh_Token [MASKED]");
    }

    #[test]
    fn test_leaves_plain_text_alone() {
        assert_eq!(
            sanitize_message("To sign in, use the code ABC"),
            "To sign in, use the code ABC"
        );
    }

    #[test]
    fn test_trims_trailing_newline() {
        assert_eq!(sanitize_message("hello\r\n"), "hello");
    }
}
