//! Twilio webhook signature validation.
//!
//! Twilio signs every webhook with HMAC-SHA1 over the full request URL
//! followed by the form parameters sorted by key, keyed with the account's
//! auth token, and sends the base64 digest in `X-Twilio-Signature`.

use std::collections::HashMap;

use base64::engine::Engine;
use ring::hmac;

/// Compute the expected signature for a request
pub fn compute_signature(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    let mut validation_string = url.to_string();
    let mut sorted_params: Vec<(&String, &String)> = params.iter().collect();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));

    for (key, value) in sorted_params {
        validation_string.push_str(key);
        validation_string.push_str(value);
    }

    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    let digest = hmac::sign(&key, validation_string.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest.as_ref())
}

/// Validate a request signature against the auth token
pub fn validate_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &HashMap<String, String>,
) -> bool {
    let expected = compute_signature(auth_token, url, params);
    ring::constant_time::verify_slices_are_equal(signature.as_bytes(), expected.as_bytes()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("CallSid".to_string(), "CA123".to_string());
        params.insert("From".to_string(), "+14155550123".to_string());
        params
    }

    #[test]
    fn test_valid_signature_accepted() {
        let url = "https://example.com/webhook/voice";
        let params = sample_params();
        let signature = compute_signature("secret-token", url, &params);
        assert!(validate_signature("secret-token", &signature, url, &params));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let url = "https://example.com/webhook/voice";
        let params = sample_params();
        assert!(!validate_signature(
            "secret-token",
            "bm90LWEtcmVhbC1zaWduYXR1cmU=",
            url,
            &params
        ));
    }

    #[test]
    fn test_signature_depends_on_params() {
        let url = "https://example.com/webhook/voice";
        let params = sample_params();
        let signature = compute_signature("secret-token", url, &params);

        let mut tampered = params.clone();
        tampered.insert("CallSid".to_string(), "CA999".to_string());
        assert!(!validate_signature("secret-token", &signature, url, &tampered));
    }
}
