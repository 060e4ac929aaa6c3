//! # HTTP Utilities
//!
//! Response-body helpers shared by the vendor clients: strict JSON parsing
//! (the appliances occasionally answer HTML error pages with a 200) and
//! bounded body excerpts for failure log details.

use anyhow::{Result, bail};
use serde_json::Value;

/// Upper bound on response-body excerpts embedded in log details.
const BODY_SNIPPET_LIMIT: usize = 512;

/// Parse a response body as JSON, rejecting empty and non-JSON payloads.
///
/// # Example
/// ```rust
/// use vaultline_util::http::parse_json_strict;
///
/// assert!(parse_json_strict(r#"{"values": []}"#).is_ok());
/// assert!(parse_json_strict("").is_err());
/// assert!(parse_json_strict("<html>login expired</html>").is_err());
/// ```
pub fn parse_json_strict(body: &str) -> Result<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        bail!("empty response body where JSON was expected");
    }
    if trimmed.starts_with('<') {
        bail!("non-JSON response body: {}", body_snippet(trimmed));
    }
    serde_json::from_str(trimmed).map_err(|error| anyhow::anyhow!("malformed JSON response: {error}"))
}

/// Bounded excerpt of a response body, safe to embed in a log record.
pub fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_accepts_json_and_rejects_html() {
        assert!(parse_json_strict(r#"{"Refs": []}"#).is_ok());
        assert!(parse_json_strict("  \n").is_err());
        assert!(parse_json_strict("<html><body>503</body></html>").is_err());
        assert!(parse_json_strict("{truncated").is_err());
    }

    #[test]
    fn snippets_are_bounded_and_respect_char_boundaries() {
        let short = "short body";
        assert_eq!(body_snippet(short), short);

        let long = "é".repeat(600);
        let snippet = body_snippet(&long);
        assert!(snippet.ends_with('…'));
        assert!(snippet.len() <= BODY_SNIPPET_LIMIT + '…'.len_utf8());
    }
}
