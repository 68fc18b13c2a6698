//! Utility functions shared by the RyuBot crates.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Uses character boundaries, so multi-byte text never splits mid-character.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Keep at most `max_chars` characters of `s`, without any marker.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Sanitize a string for safe logging (redact sensitive patterns).
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"(?i)(api[_-]?key|apikey)[=:]\s*\S{20,}", "$1=***REDACTED***"),
        (r"(?i)(token|secret|bearer)\s*[=:]\s*\S{10,}", "$1=***REDACTED***"),
        (r"sk-[a-zA-Z0-9]{20,}", "***REDACTED_API_KEY***"),
        (r"bot\d{6,}:[A-Za-z0-9_-]{20,}", "bot***REDACTED_BOT_TOKEN***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("hello", 10, "hello" ; "short")]
    #[test_case("hello world", 5, "hello..." ; "truncated")]
    #[test_case("😀😀😀😀", 2, "😀😀..." ; "multibyte")]
    #[test_case("", 10, "" ; "empty")]
    fn test_truncate_with_ellipsis(input: &str, max: usize, expected: &str) {
        assert_eq!(truncate_with_ellipsis(input, max), expected);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn test_sanitize_for_log() {
        let input = "Using api_key=sk-proj-12345678901234567890";
        let output = sanitize_for_log(input);
        assert!(!output.contains("sk-proj-12345678901234567890"));
        assert!(output.contains("REDACTED"));
    }

    #[test]
    fn test_sanitize_bot_token_in_url() {
        let input = "error sending request for url \
                     (https://api.telegram.org/bot123456789:AAEabcdefghijklmnopqrstuvwxyz/getMe)";
        let output = sanitize_for_log(input);
        assert!(!output.contains("AAEabcdefghijklmnopqrstuvwxyz"));
    }
}
