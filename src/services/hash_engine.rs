use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::errors::{AppError, Result};
use crate::models::otp_session::SESSION_TOKEN_BYTES;
use crate::models::purpose::OtpPurpose;

/// Deterministic salted + peppered SHA-256 hashing for codes, tokens and
/// correlation fields. Never reversible; the pepper lives only in server
/// config so a leaked database alone cannot be brute-forced.
#[derive(Clone)]
pub struct HashEngine {
    pepper: String,
}

impl HashEngine {
    pub fn new(pepper: String) -> Result<Self> {
        if pepper.trim().is_empty() {
            return Err(AppError::FailedPrecondition(
                "OTP pepper is not configured".to_string(),
            ));
        }
        Ok(Self { pepper })
    }

    // 6-digit code, uniform over 000000..=999999
    pub fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(0..1_000_000))
    }

    pub fn generate_salt() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Opaque bearer token for a verified session. Returned to the client
    /// exactly once; only its hash is stored.
    pub fn generate_session_token() -> String {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn digest(&self, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.pepper.as_bytes());
        for part in parts {
            hasher.update([0u8]);
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn hash_code(&self, code: &str, salt: &str) -> String {
        self.digest(&["code", salt, code])
    }

    pub fn hash_token(&self, token: &str) -> String {
        self.digest(&["token", token])
    }

    /// Emails, IPs, push tokens: anything stored only for correlation.
    pub fn hash_identifier(&self, value: &str) -> String {
        self.digest(&["id", value])
    }

    /// Deterministic `_id` for the one live OtpRequest per (email, purpose).
    pub fn request_key(&self, purpose: OtpPurpose, email: &str) -> String {
        self.digest(&["request", purpose.tag(), email])
    }

    /// Deterministic `_id` for the one DeviceRecord per (account, device).
    pub fn device_key(&self, uid: &str, device_id: &str) -> String {
        self.digest(&["device", uid, device_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> HashEngine {
        HashEngine::new("test-pepper".to_string()).unwrap()
    }

    #[test]
    fn empty_pepper_is_refused() {
        assert!(HashEngine::new(String::new()).is_err());
        assert!(HashEngine::new("   ".to_string()).is_err());
    }

    #[test]
    fn code_hashing_is_deterministic_and_salted() {
        let e = engine();
        assert_eq!(e.hash_code("123456", "s1"), e.hash_code("123456", "s1"));
        assert_ne!(e.hash_code("123456", "s1"), e.hash_code("123456", "s2"));
        assert_ne!(e.hash_code("123456", "s1"), e.hash_code("654321", "s1"));
    }

    #[test]
    fn pepper_changes_every_hash() {
        let a = engine();
        let b = HashEngine::new("other-pepper".to_string()).unwrap();
        assert_ne!(a.hash_code("123456", "s"), b.hash_code("123456", "s"));
        assert_ne!(a.hash_token("tok"), b.hash_token("tok"));
        assert_ne!(a.hash_identifier("a@x.com"), b.hash_identifier("a@x.com"));
    }

    #[test]
    fn domain_separation_between_hash_kinds() {
        let e = engine();
        assert_ne!(e.hash_token("v"), e.hash_identifier("v"));
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..50 {
            let code = HashEngine::generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn session_tokens_are_high_entropy_and_url_safe() {
        let t1 = HashEngine::generate_session_token();
        let t2 = HashEngine::generate_session_token();
        assert_ne!(t1, t2);
        // 24 bytes -> 32 base64 chars, no padding
        assert_eq!(t1.len(), 32);
        assert!(t1.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn request_keys_separate_purposes() {
        let e = engine();
        let a = e.request_key(OtpPurpose::ResetPassword, "a@x.com");
        let b = e.request_key(OtpPurpose::SignupVerify, "a@x.com");
        let c = e.request_key(OtpPurpose::ResetPassword, "b@x.com");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
