//! Ownership marker codec
//!
//! The external tracker has no concept of the portal's user identity, so the
//! submitter is recorded as a trailing text marker inside ticket and comment
//! bodies:
//!
//! ```text
//! <body>
//!
//! ----
//! Display Name: Ada Lovelace
//! Owner ID: 123456789012345678
//! ```
//!
//! `extract` recovers the owner ID from a body, `sanitize` strips the marker
//! before any body leaves this crate. Sanitization is a data-leak prevention
//! invariant: every description and comment body returned to a caller must
//! pass through it.

use lazy_static::lazy_static;
use regex::Regex;

/// Separator between user-authored text and the marker block
const MARKER_SEPARATOR: &str = "\n\n----\n";

/// Owner IDs are numeric snowflake-style identifiers, 15-20 digits
const ID_PATTERN: &str = r"\d{15,20}";

lazy_static! {
    static ref OWNER_LINE: Regex =
        Regex::new(&format!(r"Owner ID:[ \t]*({ID_PATTERN})\b")).expect("valid owner regex");
    static ref BARE_ID: Regex =
        Regex::new(&format!(r"\b({ID_PATTERN})\b")).expect("valid bare id regex");
    static ref LABEL_LINES: Regex =
        Regex::new(r"(?m)^[ \t]*(?:Display Name|Owner ID):.*$").expect("valid label regex");
}

/// Append an ownership marker to a body.
///
/// The caller is responsible for not embedding twice; `sanitize` the body
/// first when re-submitting tracker-sourced text.
pub fn embed(body: &str, owner_id: &str, display_name: Option<&str>) -> String {
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(body.trim_end());
    out.push_str(MARKER_SEPARATOR);
    if let Some(name) = display_name {
        out.push_str("Display Name: ");
        out.push_str(name);
        out.push('\n');
    }
    out.push_str("Owner ID: ");
    out.push_str(owner_id);
    out
}

/// Extract the owner ID from a body, if present.
///
/// Prefers the strict `Owner ID:` marker line. Falls back to a word-boundary
/// scan for a bare ID, which is ambiguous if an ID-shaped number appears in
/// user-authored text; a missing marker means "unowned/unverifiable", not an
/// error.
pub fn extract(body: &str) -> Option<String> {
    if let Some(caps) = OWNER_LINE.captures(body) {
        return Some(caps[1].to_string());
    }

    // TODO: drop this scan once descriptions created before the marker
    // format are gone from the tracker.
    BARE_ID.captures(body).map(|caps| caps[1].to_string())
}

/// Strip the ownership marker from a body.
///
/// Removes everything from the marker separator onward. If the separator is
/// absent (the tracker or a user may have rewritten the body), the known
/// label lines are stripped individually instead.
pub fn sanitize(body: &str) -> String {
    if let Some(idx) = body.find(MARKER_SEPARATOR) {
        return body[..idx].trim_end().to_string();
    }

    LABEL_LINES.replace_all(body, "").trim_end().to_string()
}

/// True if the body carries a marker owned by `owner_id`.
pub fn is_owned_by(body: &str, owner_id: &str) -> bool {
    extract(body).as_deref() == Some(owner_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "123456789012345678";

    #[test]
    fn test_embed_extract_round_trip() {
        let body = "My printer is on fire.";
        let embedded = embed(body, OWNER, None);
        assert_eq!(extract(&embedded).as_deref(), Some(OWNER));
    }

    #[test]
    fn test_embed_with_display_name() {
        let embedded = embed("Help please", OWNER, Some("Ada Lovelace"));
        assert!(embedded.contains("Display Name: Ada Lovelace"));
        assert_eq!(extract(&embedded).as_deref(), Some(OWNER));
    }

    #[test]
    fn test_sanitize_inverts_embed() {
        let body = "A plain description.\nSecond line.";
        let embedded = embed(body, OWNER, Some("Ada"));
        assert_eq!(sanitize(&embedded), body);
    }

    #[test]
    fn test_extract_missing_marker() {
        assert_eq!(extract("no marker here"), None);
    }

    #[test]
    fn test_extract_rejects_short_and_long_ids() {
        assert_eq!(extract("Owner ID: 12345"), None);
        // 25 digits: too long for a snowflake
        assert_eq!(extract("Owner ID: 1234567890123456789012345"), None);
    }

    #[test]
    fn test_extract_fallback_bare_id() {
        let body = format!("user {} reported this", OWNER);
        assert_eq!(extract(&body).as_deref(), Some(OWNER));
    }

    #[test]
    fn test_sanitize_without_separator_strips_labels() {
        let body = format!("Body text\nOwner ID: {}\nDisplay Name: Ada", OWNER);
        let cleaned = sanitize(&body);
        assert!(!cleaned.contains("Owner ID"));
        assert!(!cleaned.contains("Display Name"));
        assert!(cleaned.contains("Body text"));
    }

    #[test]
    fn test_is_owned_by() {
        let embedded = embed("body", OWNER, None);
        assert!(is_owned_by(&embedded, OWNER));
        assert!(!is_owned_by(&embedded, "876543210987654321"));
    }

    #[test]
    fn test_sanitize_plain_body_is_identity() {
        let body = "nothing embedded";
        assert_eq!(sanitize(body), body);
    }
}
