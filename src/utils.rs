//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Redact an identifier for logging, keeping a short recognizable prefix.
pub fn mask(value: &str) -> String {
    if value.trim().is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{}*** (len={})", prefix, value.chars().count())
}

/// Clip a value to its first `visible` characters for logging.
pub fn preview(value: &str, visible: usize) -> String {
    if value.trim().is_empty() {
        return "<empty>".to_string();
    }
    value.chars().take(visible).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_short_prefix() {
        assert_eq!(mask("player-12345"), "play*** (len=12)");
        assert_eq!(mask("ab"), "ab*** (len=2)");
    }

    #[test]
    fn test_mask_empty_values() {
        assert_eq!(mask(""), "<empty>");
        assert_eq!(mask("   "), "<empty>");
    }

    #[test]
    fn test_preview_clips_value() {
        assert_eq!(preview("v1.abcdef.123456", 8), "v1.abcde");
        assert_eq!(preview("short", 12), "short");
        assert_eq!(preview("", 4), "<empty>");
    }
}
