//! Webhook request authentication
//!
//! Two schemes, either of which admits a request:
//!
//! 1. HMAC-SHA256 over the raw body, carried base64-encoded in the
//!    `X-Hub-Signature` header
//! 2. A shared secret token in the `secret` query parameter
//!
//! Both comparisons are constant-time: `Mac::verify_slice` for the HMAC,
//! `subtle::ConstantTimeEq` for the token.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify a base64-encoded HMAC-SHA256 signature over the raw body
pub fn verify_signature(secret: &str, body: &[u8], signature_b64: &str) -> bool {
    let Ok(signature) = base64::engine::general_purpose::STANDARD.decode(signature_b64.trim())
    else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Compare a provided shared-secret token against the expected one
pub fn verify_secret_token(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Authenticate a webhook request under either scheme
pub fn authenticate(
    secret: &str,
    body: &[u8],
    signature_header: Option<&str>,
    secret_param: Option<&str>,
) -> bool {
    if let Some(signature) = signature_header {
        if verify_signature(secret, body, signature) {
            return true;
        }
    }
    if let Some(token) = secret_param {
        if verify_secret_token(secret, token) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"issueKey":"SUP-1"}"#;
        let signature = sign("hook-secret", body);
        assert!(verify_signature("hook-secret", body, &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"issueKey":"SUP-1"}"#;
        let signature = sign("other-secret", body);
        assert!(!verify_signature("hook-secret", body, &signature));
    }

    #[test]
    fn test_modified_body_rejected() {
        let signature = sign("hook-secret", br#"{"issueKey":"SUP-1"}"#);
        assert!(!verify_signature(
            "hook-secret",
            br#"{"issueKey":"SUP-2"}"#,
            &signature
        ));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!verify_signature("hook-secret", b"body", "!!not-base64!!"));
        assert!(!verify_signature("hook-secret", b"body", ""));
    }

    #[test]
    fn test_secret_token_comparison() {
        assert!(verify_secret_token("tok-123", "tok-123"));
        assert!(!verify_secret_token("tok-123", "tok-124"));
        assert!(!verify_secret_token("tok-123", "tok-12"));
        assert!(!verify_secret_token("tok-123", ""));
    }

    #[test]
    fn test_authenticate_either_scheme() {
        let body = b"payload";
        let signature = sign("s3cret", body);

        // Signature alone
        assert!(authenticate("s3cret", body, Some(&signature), None));
        // Token alone
        assert!(authenticate("s3cret", body, None, Some("s3cret")));
        // Bad signature but good token still admits
        assert!(authenticate("s3cret", body, Some("bad"), Some("s3cret")));
        // Both invalid
        assert!(!authenticate("s3cret", body, Some("bad"), Some("wrong")));
        // Neither present
        assert!(!authenticate("s3cret", body, None, None));
    }
}
