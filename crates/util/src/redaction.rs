//! Redaction of function keys and credentials before they reach the logs.

use once_cell::sync::Lazy;
use regex::Regex;

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // `code=` query parameter carrying a function key
        r"(?i)([?&]code=)([^&\s#]+)",
        r"(?i)(x-functions-key:\s*)([^\s]+)",
        r"(?i)(authorization:\s+)([^\s]+(?:\s+[^\s]+)*)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s&]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("redaction pattern should compile"))
    .collect()
});

/// Redacts function keys and secret-looking values in a string.
///
/// ```rust
/// use fnhost_util::redact_secrets;
///
/// let redacted = redact_secrets("/api/HttpTriggerKotlin?name=World&code=abc123");
/// assert_eq!(redacted, "/api/HttpTriggerKotlin?name=World&code=[REDACTED]");
/// ```
pub fn redact_secrets(input: &str) -> String {
    redact_secrets_with(input, "[REDACTED]")
}

/// Redacts secret-looking values, using a custom replacement token.
pub fn redact_secrets_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{replacement}")
            })
            .to_string();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_code_query_parameter() {
        assert_eq!(redact_secrets("/api/hello?code=s3cr3t"), "/api/hello?code=[REDACTED]");
        assert_eq!(
            redact_secrets("/api/hello?code=s3cr3t&name=World"),
            "/api/hello?code=[REDACTED]&name=World"
        );
    }

    #[test]
    fn redacts_function_key_header() {
        assert_eq!(redact_secrets("x-functions-key: abc"), "x-functions-key: [REDACTED]");
    }

    #[test]
    fn redacts_environment_style_assignments() {
        assert_eq!(redact_secrets("MASTER_KEY=abc other=1"), "MASTER_KEY=[REDACTED] other=1");
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        let input = "/api/hello?name=codes";
        assert_eq!(redact_secrets(input), input);
    }
}
