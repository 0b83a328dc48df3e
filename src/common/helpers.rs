// Helper functions for safe logging and timestamp handling

use chrono::{Duration, NaiveDateTime, Utc};

/// Timestamp format matching sqlite's datetime('now') output.
/// Lexicographic order on this format equals chronological order.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC timestamp in database format
pub fn now_ts() -> String {
    Utc::now().format(TS_FORMAT).to_string()
}

/// UTC timestamp `duration` from now in database format
pub fn ts_after(duration: Duration) -> String {
    (Utc::now() + duration).format(TS_FORMAT).to_string()
}

pub fn parse_ts(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT).ok()
}

/// True when the timestamp is strictly before the current time.
/// Unparseable timestamps are treated as expired.
pub fn ts_in_past(value: &str) -> bool {
    match parse_ts(value) {
        Some(ts) => ts < Utc::now().naive_utc(),
        None => true,
    }
}

/// Masks email addresses for safe logging
/// Prevents sensitive data exposure while preserving debugging utility
///
/// # Example
/// ```
/// let masked = safe_email_log("user@example.com");
/// // Returns: "u***@example.com"
/// ```
pub fn safe_email_log(email: &str) -> String {
    if email.len() > 3 {
        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() == 2 {
            // first char, not first byte: the local part comes from the
            // provider and may start with a multibyte character
            match parts[0].chars().next() {
                Some(first) => format!("{}***@{}", first, parts[1]),
                None => "***@***.***".to_string(),
            }
        } else {
            "***@***.***".to_string()
        }
    } else {
        "***@***.***".to_string()
    }
}

/// Masks tokens for safe logging
/// Shows only first and last 4 characters
pub fn safe_token_log(token: &str) -> String {
    if token.len() > 8 {
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_email_log_masks_local_part() {
        assert_eq!(safe_email_log("user@example.com"), "u***@example.com");
        assert_eq!(safe_email_log("ab"), "***@***.***");
        assert_eq!(safe_email_log("no-at-sign"), "***@***.***");
    }

    #[test]
    fn test_safe_email_log_handles_multibyte_local_part() {
        assert_eq!(safe_email_log("émile@example.com"), "é***@example.com");
        assert_eq!(safe_email_log("日本@example.jp"), "日***@example.jp");
    }

    #[test]
    fn test_ts_ordering() {
        let past = ts_after(Duration::hours(-1));
        let future = ts_after(Duration::hours(1));
        assert!(ts_in_past(&past));
        assert!(!ts_in_past(&future));
        // lexicographic comparison matches chronological order
        assert!(past < future);
    }

    #[test]
    fn test_unparseable_ts_is_expired() {
        assert!(ts_in_past("not-a-timestamp"));
    }
}
