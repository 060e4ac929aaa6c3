use once_cell::sync::Lazy;
use regex::Regex;

pub mod date_handling;
pub mod http;
pub mod matching;

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+]+ ?[\w\-\.=:/+]*)",
        r"(?i)(x-restsvcsessionid: ?)([\w\-\.=/+]+)",
        r#"(?i)("?(access_token|refresh_token)"?\s*[:=]\s*"?)([\w\-\.=/+]+)"#,
        r"(?i)([A-Z0-9_]*?(KEY|TOKEN|SECRET|PASSWORD))=([^\s]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Log details are frequently built from raw response bodies; session
/// headers and token grants must never land in the workflow log, so every
/// handler passes failure details through here.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}
