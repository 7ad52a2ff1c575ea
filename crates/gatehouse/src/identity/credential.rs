//! Signed session credentials.
//!
//! Token format: `base64(claims_json).base64(ed25519_signature)`
//!
//! - The signature covers the exact claims bytes
//! - Tokens carry their own expiry and issuer
//! - Only the holder of the signing key can mint; anyone with the public
//!   key can validate

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use quad_common::SessionClaims;
use thiserror::Error;

/// Reasons a presented credential is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Malformed credential: {0}")]
    Malformed(&'static str),

    #[error("Invalid credential signature")]
    BadSignature,

    #[error("Credential issued by {0}")]
    WrongIssuer(String),

    #[error("Credential expired")]
    Expired,
}

/// Mints and validates session credentials
pub struct SessionSigner {
    /// Issuer claim stamped into every token
    issuer: String,
    /// Token validity in seconds
    ttl_secs: u64,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl SessionSigner {
    /// Create a signer, loading a 32-byte seed from `key_path` if given
    pub fn new(issuer: &str, ttl_secs: u64, key_path: Option<&str>) -> Result<Self> {
        let signing_key = match key_path {
            Some(path) => {
                let key_bytes = std::fs::read(path).context("Failed to read session signing key")?;

                if key_bytes.len() != 32 {
                    bail!("Invalid session signing key length (expected 32 bytes)");
                }

                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&key_bytes);
                SigningKey::from_bytes(&bytes)
            }
            None => {
                use rand_core::OsRng;
                tracing::warn!("Using ephemeral session key (sessions end on restart)");
                SigningKey::generate(&mut OsRng)
            }
        };

        Ok(Self::from_key(issuer, ttl_secs, signing_key))
    }

    pub fn from_key(issuer: &str, ttl_secs: u64, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            issuer: issuer.to_string(),
            ttl_secs,
            signing_key,
            verifying_key,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Our public key as base64
    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.verifying_key.as_bytes())
    }

    /// Mint a credential for an identity
    pub fn mint(&self, sub: &str, email: &str, now: i64) -> Result<(String, SessionClaims)> {
        let claims = SessionClaims {
            sub: sub.to_string(),
            email: email.to_string(),
            issued_at: now,
            expires_at: now + self.ttl_secs as i64,
            issuer: self.issuer.clone(),
        };

        let payload = serde_json::to_vec(&claims).context("Failed to encode session claims")?;
        let signature = self.signing_key.sign(&payload);

        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );

        tracing::debug!(sub = %sub, expires_at = claims.expires_at, "Issued session credential");

        Ok((token, claims))
    }

    /// Validate a presented credential
    pub fn validate(&self, token: &str, now: i64) -> Result<SessionClaims, CredentialError> {
        let (payload_b64, sig_b64) = token
            .split_once('.')
            .ok_or(CredentialError::Malformed("expected 2 parts"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| CredentialError::Malformed("payload encoding"))?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| CredentialError::Malformed("signature encoding"))?;

        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| CredentialError::Malformed("signature length"))?;
        let signature = Signature::from_bytes(&sig_array);

        self.verifying_key
            .verify(&payload, &signature)
            .map_err(|_| CredentialError::BadSignature)?;

        let claims: SessionClaims = serde_json::from_slice(&payload)
            .map_err(|_| CredentialError::Malformed("claims"))?;

        if claims.issuer != self.issuer {
            return Err(CredentialError::WrongIssuer(claims.issuer));
        }
        if claims.is_expired_at(now) {
            return Err(CredentialError::Expired);
        }

        Ok(claims)
    }
}
