//! One-time-password email authentication.
//!
//! - `manager` - challenge lifecycle (issue, verify, consume)
//! - `store` - pluggable challenge storage with compare-and-swap updates
//! - `sweeper` - background removal of expired challenges

mod codes;
mod manager;
mod redis_store;
mod store;
mod sweeper;

pub use codes::generate_id;
pub use manager::{OtpManager, OtpSettings};
pub use redis_store::RedisChallengeStore;
pub use store::{ChallengeStore, MemoryChallengeStore};
pub use sweeper::SweeperHandle;
