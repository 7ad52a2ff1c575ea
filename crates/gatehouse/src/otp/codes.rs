//! Code, id, and address helpers for OTP issuance.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use quad_common::constants::{OTP_CODE_MAX, OTP_CODE_MIN};
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Uniform 6-digit code in [100000, 999999]
pub fn generate_code() -> String {
    rand::rng()
        .random_range(OTP_CODE_MIN..=OTP_CODE_MAX)
        .to_string()
}

/// Hash a code so the plaintext never reaches the store.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a cryptographically random 128-bit id
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
