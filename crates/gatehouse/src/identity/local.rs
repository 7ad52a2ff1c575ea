//! In-process identity issuer.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use quad_common::SessionClaims;

use super::credential::{CredentialError, SessionSigner};
use super::{Credential, IdentityIssuer, IdentityRecord};
use crate::otp::generate_id;

/// Identity issuer keeping accounts in memory and signing its own credentials
pub struct LocalIssuer {
    /// email -> identity
    identities: DashMap<String, IdentityRecord>,
    signer: SessionSigner,
}

impl LocalIssuer {
    pub fn new(signer: SessionSigner) -> Self {
        Self {
            identities: DashMap::new(),
            signer,
        }
    }

    /// Validate a credential minted by this issuer
    pub fn validate(&self, token: &str) -> Result<SessionClaims, CredentialError> {
        self.signer.validate(token, chrono::Utc::now().timestamp())
    }

    /// Public half of the session signing key
    pub fn public_key_b64(&self) -> String {
        self.signer.public_key_b64()
    }

    /// Issuer claim this issuer stamps and accepts
    pub fn issuer(&self) -> &str {
        self.signer.issuer()
    }

    /// Number of known identities
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }
}

#[async_trait]
impl IdentityIssuer for LocalIssuer {
    async fn find_or_create_identity(&self, address: &str) -> Result<IdentityRecord> {
        let record = self
            .identities
            .entry(address.to_string())
            .or_insert_with(|| {
                tracing::info!(email = %address, "Created identity");
                IdentityRecord {
                    id: generate_id(),
                    email: address.to_string(),
                    verified: true,
                    created_at: chrono::Utc::now().timestamp(),
                }
            })
            .value()
            .clone();

        Ok(record)
    }

    async fn issue_credential(&self, identity: &IdentityRecord) -> Result<Credential> {
        let now = chrono::Utc::now().timestamp();
        let (token, claims) = self.signer.mint(&identity.id, &identity.email, now)?;

        Ok(Credential {
            token,
            expires_at: claims.expires_at,
        })
    }
}
