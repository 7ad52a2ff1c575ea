//! Core types shared across Quad components.

use serde::{Deserialize, Serialize};

/// A pending OTP challenge, one per identity.
///
/// The plaintext code is never stored, only its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Normalized email address (store key)
    pub identity: String,

    /// Random id of this issuance
    pub challenge_id: String,

    /// URL-safe base64 SHA-256 of the code
    pub code_hash: String,

    /// Creation timestamp (Unix epoch seconds)
    pub issued_at: i64,

    /// Expiry timestamp (Unix epoch seconds)
    pub expires_at: i64,

    /// Failed verifications so far
    pub attempt_count: u32,
}

impl Challenge {
    /// True once `now` is strictly past the expiry timestamp
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Seconds of validity left at `now`
    pub fn remaining_secs(&self, now: i64) -> u64 {
        (self.expires_at - now).max(0) as u64
    }

    /// Attempts left before the challenge is exhausted
    pub fn remaining_attempts(&self, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.attempt_count)
    }

    /// Copy of this challenge with one more failed attempt recorded
    pub fn with_failed_attempt(&self) -> Self {
        Self {
            attempt_count: self.attempt_count + 1,
            ..self.clone()
        }
    }
}

/// Whether the issued code is returned to the HTTP caller or only sent out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureMode {
    /// Development: the code is returned in the response body
    Disclose,
    /// Production: the code is only handed to the notifier
    #[default]
    SendOnly,
}

impl std::str::FromStr for DisclosureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disclose" => Ok(Self::Disclose),
            "send_only" | "send-only" => Ok(Self::SendOnly),
            other => Err(format!("unknown disclosure mode: {other}")),
        }
    }
}

/// Result of a successful `RequestChallenge`
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub identity: String,
    pub code: String,
    pub expires_in_secs: u64,
    pub mode: DisclosureMode,
}

impl IssuedChallenge {
    /// The code, only when the configured mode allows returning it
    pub fn disclosed_code(&self) -> Option<&str> {
        match self.mode {
            DisclosureMode::Disclose => Some(&self.code),
            DisclosureMode::SendOnly => None,
        }
    }
}

/// Minimal identity summary returned after verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    /// Local-part of the address, a display name placeholder
    pub name: String,
    pub verified: bool,
}

/// Result of a successful `VerifyChallenge`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSession {
    /// Signed session credential
    pub token: String,
    /// Credential expiry (Unix epoch seconds)
    pub expires_at: i64,
    pub user: UserSummary,
}

/// Claims carried by a session credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity id
    pub sub: String,
    pub email: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub issuer: String,
}

impl SessionClaims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Local-part of an address (`jo` for `jo@campus.edu`)
pub fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}
