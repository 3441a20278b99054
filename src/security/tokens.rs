//! Opaque high-entropy token generation and the hashing/signing primitives
//! built on top of it: session tokens, password-reset tokens, and machine
//! API keys all come from [`generate_token`]; webhook payload signing uses
//! [`hmac_sha256_hex`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Generate an opaque token from 32 bytes of CSPRNG output (256 bits of
/// entropy), URL-safe base64 without padding (`spec.md` Sec. 4.3).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex-encoded `HMAC-SHA256(key, body)`, used to sign outbound webhook
/// payloads (`X-LunaSentri-Signature`, `spec.md` Sec. 4.7).
pub fn hmac_sha256_hex(key: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hmac_is_deterministic_for_same_key_and_body() {
        let sig1 = hmac_sha256_hex("secret", b"payload");
        let sig2 = hmac_sha256_hex("secret", b"payload");
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, hmac_sha256_hex("other-secret", b"payload"));
    }
}
