//! Shared constants for Quad components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Gatehouse HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// OTP challenge validity (5 minutes)
pub const OTP_TTL_SECS: u64 = 300;

/// Failed verifications allowed per challenge
pub const OTP_MAX_ATTEMPTS: u32 = 3;

/// Interval between expired-challenge sweeps (5 minutes)
pub const OTP_SWEEP_INTERVAL_SECS: u64 = 300;

/// Inclusive range the 6-digit code is drawn from
pub const OTP_CODE_MIN: u32 = 100_000;
pub const OTP_CODE_MAX: u32 = 999_999;

/// Session credential validity (7 days)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Issuer claim stamped into session credentials
pub const DEFAULT_SESSION_ISSUER: &str = "quad";

/// Redis key prefixes
pub mod redis_keys {
    /// Pending OTP challenge: otp:{identity}
    pub const OTP_PREFIX: &str = "otp:";
}
