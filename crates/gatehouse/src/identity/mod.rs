//! Identity records and session credential issuance.

mod credential;
mod local;

pub use credential::SessionSigner;
pub use local::LocalIssuer;

use anyhow::Result;
use async_trait::async_trait;

/// Account record keyed by email address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: String,
    pub email: String,
    pub verified: bool,
    /// Creation timestamp (Unix epoch seconds)
    pub created_at: i64,
}

/// A minted session credential
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub expires_at: i64,
}

/// Identity provider consulted after a code is matched.
#[async_trait]
pub trait IdentityIssuer: Send + Sync {
    /// Look up the identity for an address, creating it pre-verified if absent
    async fn find_or_create_identity(&self, address: &str) -> Result<IdentityRecord>;

    /// Mint a session credential for an identity
    async fn issue_credential(&self, identity: &IdentityRecord) -> Result<Credential>;
}
