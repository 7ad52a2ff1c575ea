//! # Quad Common
//!
//! Shared types, errors, and constants used across Quad components.
//!
//! ## Modules
//! - `types` - Challenge records, session summaries, disclosure modes
//! - `error` - The OTP/auth error kinds surfaced to callers
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::AuthError;
pub use types::*;
