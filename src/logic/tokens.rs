//! Secret generation and hashing shared by invitations, API keys,
//! certificates and webhook signatures.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_PREFIX: &str = "lk_";

/// Characters of the plaintext key kept for display (`lk_` + 8 hex)
pub const API_KEY_DISPLAY_LEN: usize = 11;

/// 32 random bytes as 64 hex characters
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// `lk_` followed by 64 hex characters
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, generate_token())
}

/// 12 uppercase hex characters, e.g. `3FA94C0D17B2`
pub fn generate_verification_code() -> String {
    let bytes: [u8; 6] = rand::thread_rng().gen();
    hex::encode_upper(bytes)
}

/// Hex SHA-256; the only form in which tokens and keys are stored
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a `sha256=<hex>` signature header against the payload in constant time
pub fn verify_signature(payload: &[u8], secret: &str, header: &str) -> bool {
    let Some(signature_hex) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_shape() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + 64);
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_hash_secret() {
        let hash = hash_secret("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_secret("secret"));
        assert_ne!(hash, hash_secret("Secret"));
    }

    #[test]
    fn test_verification_code_shape() {
        let code = generate_verification_code();
        assert_eq!(code.len(), 12);
        assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_signature_verification() {
        let body = br#"{"id":"evt_1"}"#;
        let header = format!("sha256={}", sign_payload(body, "whsec"));
        assert!(verify_signature(body, "whsec", &header));
        assert!(!verify_signature(body, "other", &header));
        assert!(!verify_signature(b"{}", "whsec", &header));
        assert!(!verify_signature(body, "whsec", "sha1=abcd"));
        assert!(!verify_signature(body, "whsec", "sha256=zz"));
    }
}
