//! Error kinds surfaced by the OTP session manager.

use thiserror::Error;

/// Failures of `RequestChallenge` / `VerifyChallenge`.
///
/// Every kind is recoverable and reported to the immediate caller; nothing is
/// retried inside the manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Malformed address on request
    #[error("Invalid email address")]
    InvalidIdentity,

    /// Identity or code absent on verify
    #[error("Email and OTP are required")]
    MissingInput,

    /// No challenge on record for the identity
    #[error("OTP not found or expired")]
    NotFoundOrExpired,

    /// Challenge existed but its window passed
    #[error("OTP has expired")]
    Expired,

    /// Too many wrong guesses, a new code must be requested
    #[error("Too many failed attempts, request a new OTP")]
    AttemptsExhausted,

    /// Wrong code, attempt recorded
    #[error("Invalid OTP, {remaining_attempts} attempt(s) remaining")]
    Mismatch { remaining_attempts: u32 },

    /// Credential minting failed after the code was consumed
    #[error("Failed to issue session: {0}")]
    IssuerFailure(String),

    /// Challenge store unreachable or returned bad data
    #[error("Challenge store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidIdentity => 400,
            Self::MissingInput => 400,
            Self::NotFoundOrExpired => 404,
            Self::Expired => 410,
            Self::AttemptsExhausted => 429,
            Self::Mismatch { .. } => 401,
            Self::IssuerFailure(_) => 502,
            Self::Store(_) => 503,
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentity => "invalid_identity",
            Self::MissingInput => "missing_input",
            Self::NotFoundOrExpired => "not_found_or_expired",
            Self::Expired => "expired",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::Mismatch { .. } => "mismatch",
            Self::IssuerFailure(_) => "issuer_failure",
            Self::Store(_) => "store_unavailable",
        }
    }

    /// Returns true if the caller has to request a fresh code.
    ///
    /// `IssuerFailure` is included: the code was consumed before minting failed.
    pub fn requires_reissue(&self) -> bool {
        matches!(
            self,
            Self::NotFoundOrExpired
                | Self::Expired
                | Self::AttemptsExhausted
                | Self::IssuerFailure(_)
        )
    }

    /// Returns true if the same code may be submitted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Mismatch { .. } | Self::Store(_))
    }
}
