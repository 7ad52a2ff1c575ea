//! OTP issuance and verification.
//!
//! Per identity: `NONE -> LIVE -> {CONSUMED, EXPIRED, EXHAUSTED} -> NONE`.
//! Every transition out of LIVE is a compare-and-swap against the record that
//! was read; losing a race re-reads and re-decides.

use std::sync::Arc;

use quad_common::{
    AuthError, Challenge, DisclosureMode, IssuedChallenge, UserSummary, VerifiedSession,
    display_name,
};
use tracing::{debug, error, info, warn};

use super::codes::{generate_code, generate_id, hash_code, normalize_email, valid_email};
use super::store::ChallengeStore;
use crate::identity::IdentityIssuer;
use crate::notify::Notifier;

/// Compare-and-swap rounds before giving up on a contended identity
const MAX_SWAP_ROUNDS: usize = 16;

/// OTP manager settings
#[derive(Debug, Clone, Copy)]
pub struct OtpSettings {
    /// Challenge validity in seconds
    pub ttl_secs: u64,
    /// Failed verifications allowed per challenge
    pub max_attempts: u32,
    /// Whether the code is returned to the caller
    pub disclosure: DisclosureMode,
}

/// Owns the challenge store and the challenge lifecycle
pub struct OtpManager {
    store: Arc<dyn ChallengeStore>,
    issuer: Arc<dyn IdentityIssuer>,
    notifier: Arc<dyn Notifier>,
    settings: OtpSettings,
}

impl OtpManager {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        issuer: Arc<dyn IdentityIssuer>,
        notifier: Arc<dyn Notifier>,
        settings: OtpSettings,
    ) -> Self {
        Self {
            store,
            issuer,
            notifier,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ChallengeStore> {
        &self.store
    }

    pub fn settings(&self) -> OtpSettings {
        self.settings
    }

    /// Issue a fresh challenge, replacing any live one for the identity
    pub async fn request_challenge(&self, identity: &str) -> Result<IssuedChallenge, AuthError> {
        let identity = normalize_email(identity);
        if !valid_email(&identity) {
            return Err(AuthError::InvalidIdentity);
        }

        let code = generate_code();
        let now = chrono::Utc::now().timestamp();
        let challenge = Challenge {
            identity: identity.clone(),
            challenge_id: generate_id(),
            code_hash: hash_code(&code),
            issued_at: now,
            expires_at: now + self.settings.ttl_secs as i64,
            attempt_count: 0,
        };
        let challenge_id = challenge.challenge_id.clone();

        self.store.put(challenge).await.map_err(store_error)?;

        info!(
            identity = %identity,
            challenge_id = %challenge_id,
            mode = ?self.settings.disclosure,
            "Issued OTP challenge"
        );

        if self.settings.disclosure == DisclosureMode::SendOnly {
            self.dispatch(identity.clone(), code.clone());
        }

        Ok(IssuedChallenge {
            identity,
            code,
            expires_in_secs: self.settings.ttl_secs,
            mode: self.settings.disclosure,
        })
    }

    /// Check a submitted code; on a match consume the challenge and mint a session
    pub async fn verify_challenge(
        &self,
        identity: &str,
        submitted_code: &str,
    ) -> Result<VerifiedSession, AuthError> {
        let identity = normalize_email(identity);
        let submitted_code = submitted_code.trim();
        if identity.is_empty() || submitted_code.is_empty() {
            return Err(AuthError::MissingInput);
        }

        let submitted_hash = hash_code(submitted_code);
        let max_attempts = self.settings.max_attempts;

        for _ in 0..MAX_SWAP_ROUNDS {
            let Some(current) = self.store.get(&identity).await.map_err(store_error)? else {
                return Err(AuthError::NotFoundOrExpired);
            };

            if current.is_expired_at(chrono::Utc::now().timestamp()) {
                if self.swap(&current, None).await? {
                    info!(identity = %identity, challenge_id = %current.challenge_id, "OTP expired");
                    return Err(AuthError::Expired);
                }
                continue;
            }

            if current.attempt_count >= max_attempts {
                if self.swap(&current, None).await? {
                    return Err(AuthError::AttemptsExhausted);
                }
                continue;
            }

            if submitted_hash != current.code_hash {
                let failed = current.with_failed_attempt();
                let attempts = failed.attempt_count;

                if attempts >= max_attempts {
                    if self.swap(&current, None).await? {
                        warn!(identity = %identity, attempts, "OTP attempts exhausted");
                        return Err(AuthError::AttemptsExhausted);
                    }
                    continue;
                }

                let remaining_attempts = failed.remaining_attempts(max_attempts);
                if self.swap(&current, Some(failed)).await? {
                    debug!(identity = %identity, attempts, "OTP mismatch");
                    return Err(AuthError::Mismatch { remaining_attempts });
                }
                continue;
            }

            // Single use: consumed before the issuer is called, whatever it returns
            if self.swap(&current, None).await? {
                info!(identity = %identity, challenge_id = %current.challenge_id, "OTP verified");
                return self.issue_session(&identity).await;
            }
        }

        error!(identity = %identity, "Challenge kept changing during verification");
        Err(AuthError::Store("challenge update contention".to_string()))
    }

    /// Number of challenges currently stored
    pub async fn pending_count(&self) -> Result<usize, AuthError> {
        self.store.len().await.map_err(store_error)
    }

    async fn swap(&self, expected: &Challenge, next: Option<Challenge>) -> Result<bool, AuthError> {
        self.store
            .compare_and_swap(expected, next)
            .await
            .map_err(store_error)
    }

    async fn issue_session(&self, identity: &str) -> Result<VerifiedSession, AuthError> {
        let record = self
            .issuer
            .find_or_create_identity(identity)
            .await
            .map_err(issuer_error)?;

        let credential = self
            .issuer
            .issue_credential(&record)
            .await
            .map_err(issuer_error)?;

        Ok(VerifiedSession {
            token: credential.token,
            expires_at: credential.expires_at,
            user: UserSummary {
                id: record.id,
                name: display_name(&record.email),
                email: record.email,
                verified: record.verified,
            },
        })
    }

    /// Hand the code to the notifier without waiting on it
    fn dispatch(&self, identity: String, code: String) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&identity, &code).await {
                warn!(identity = %identity, error = %e, "Failed to send OTP");
            }
        });
    }
}

fn store_error(e: anyhow::Error) -> AuthError {
    error!(error = %e, "Challenge store failure");
    AuthError::Store(e.to_string())
}

fn issuer_error(e: anyhow::Error) -> AuthError {
    error!(error = %e, "Identity issuer failure");
    AuthError::IssuerFailure(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Credential, IdentityRecord, LocalIssuer, SessionSigner};
    use crate::notify::LogNotifier;
    use crate::notify::testing::{BrokenNotifier, RecordingNotifier};
    use crate::otp::MemoryChallengeStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn settings(disclosure: DisclosureMode) -> OtpSettings {
        OtpSettings {
            ttl_secs: 300,
            max_attempts: 3,
            disclosure,
        }
    }

    fn issuer() -> Arc<LocalIssuer> {
        Arc::new(LocalIssuer::new(SessionSigner::new("quad", 600, None).unwrap()))
    }

    fn manager() -> (OtpManager, Arc<MemoryChallengeStore>) {
        let store = Arc::new(MemoryChallengeStore::new());
        let manager = OtpManager::new(
            store.clone(),
            issuer(),
            Arc::new(LogNotifier),
            settings(DisclosureMode::Disclose),
        );
        (manager, store)
    }

    /// A code guaranteed to differ from `code`
    fn wrong(code: &str) -> String {
        let other = if code == "000000" { "111111" } else { "000000" };
        other.to_string()
    }

    /// Move a stored challenge's expiry into the past
    async fn expire(store: &MemoryChallengeStore, identity: &str) {
        let current = store.get(identity).await.unwrap().unwrap();
        let now = chrono::Utc::now().timestamp();
        let expired = Challenge {
            expires_at: now - 1,
            ..current.clone()
        };
        assert!(store.compare_and_swap(&current, Some(expired)).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_stores_hash_not_code() {
        let (manager, store) = manager();
        let issued = manager.request_challenge(" A@B.edu ").await.unwrap();

        assert_eq!(issued.identity, "a@b.edu");
        assert_eq!(issued.expires_in_secs, 300);
        assert_eq!(issued.code.len(), 6);

        let stored = store.get("a@b.edu").await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 0);
        assert_eq!(stored.expires_at - stored.issued_at, 300);
        assert_eq!(stored.code_hash, hash_code(&issued.code));
        assert_ne!(stored.code_hash, issued.code);
    }

    #[tokio::test]
    async fn test_invalid_identity_rejected() {
        let (manager, store) = manager();
        for bad in ["", "nobody", "a@b", "a b@c.edu"] {
            assert_eq!(
                manager.request_challenge(bad).await.unwrap_err(),
                AuthError::InvalidIdentity
            );
        }
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let (manager, _) = manager();
        assert_eq!(manager.verify_challenge("", "123456").await.unwrap_err(), AuthError::MissingInput);
        assert_eq!(manager.verify_challenge("a@b.edu", "  ").await.unwrap_err(), AuthError::MissingInput);
    }

    #[tokio::test]
    async fn test_verify_succeeds_exactly_once() {
        let (manager, store) = manager();
        let issued = manager.request_challenge("a@b.edu").await.unwrap();

        let session = manager.verify_challenge("a@b.edu", &issued.code).await.unwrap();
        assert_eq!(session.user.email, "a@b.edu");
        assert_eq!(session.user.name, "a");
        assert!(session.user.verified);
        assert!(!session.token.is_empty());
        assert_eq!(store.len().await.unwrap(), 0);

        assert_eq!(
            manager.verify_challenge("a@b.edu", &issued.code).await.unwrap_err(),
            AuthError::NotFoundOrExpired
        );
    }

    #[tokio::test]
    async fn test_mismatch_then_success_then_replay() {
        let (manager, store) = manager();
        let issued = manager.request_challenge("a@b.edu").await.unwrap();

        let err = manager
            .verify_challenge("a@b.edu", &wrong(&issued.code))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Mismatch { remaining_attempts: 2 });
        assert_eq!(store.get("a@b.edu").await.unwrap().unwrap().attempt_count, 1);

        assert_ok!(manager.verify_challenge("a@b.edu", &issued.code).await);
        assert!(store.get("a@b.edu").await.unwrap().is_none());

        assert_eq!(
            manager.verify_challenge("a@b.edu", &issued.code).await.unwrap_err(),
            AuthError::NotFoundOrExpired
        );
    }

    #[tokio::test]
    async fn test_three_wrong_codes_exhaust_challenge() {
        let (manager, store) = manager();
        let issued = manager.request_challenge("a@b.edu").await.unwrap();
        let bad = wrong(&issued.code);

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(manager.verify_challenge("a@b.edu", &bad).await.unwrap_err());
        }
        assert_eq!(
            outcomes,
            vec![
                AuthError::Mismatch { remaining_attempts: 2 },
                AuthError::Mismatch { remaining_attempts: 1 },
                AuthError::AttemptsExhausted,
            ]
        );
        assert_eq!(store.len().await.unwrap(), 0);

        // Even the right code is gone now
        assert_eq!(
            manager.verify_challenge("a@b.edu", &issued.code).await.unwrap_err(),
            AuthError::NotFoundOrExpired
        );
    }

    #[tokio::test]
    async fn test_expired_challenge_reports_expired_and_is_removed() {
        let (manager, store) = manager();
        let issued = manager.request_challenge("x@y.edu").await.unwrap();
        expire(&store, "x@y.edu").await;

        assert_eq!(
            manager.verify_challenge("x@y.edu", &issued.code).await.unwrap_err(),
            AuthError::Expired
        );
        assert!(store.get("x@y.edu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_wins_over_wrong_code() {
        let (manager, store) = manager();
        let issued = manager.request_challenge("x@y.edu").await.unwrap();
        expire(&store, "x@y.edu").await;

        assert_eq!(
            manager
                .verify_challenge("x@y.edu", &wrong(&issued.code))
                .await
                .unwrap_err(),
            AuthError::Expired
        );
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_code() {
        let (manager, _) = manager();
        let first = manager.request_challenge("a@b.edu").await.unwrap();
        let mut second = manager.request_challenge("a@b.edu").await.unwrap();
        while second.code == first.code {
            second = manager.request_challenge("a@b.edu").await.unwrap();
        }

        assert!(matches!(
            manager.verify_challenge("a@b.edu", &first.code).await,
            Err(AuthError::Mismatch { .. })
        ));
        assert_ok!(manager.verify_challenge("a@b.edu", &second.code).await);
    }

    #[tokio::test]
    async fn test_reissue_resets_attempts() {
        let (manager, store) = manager();
        let first = manager.request_challenge("a@b.edu").await.unwrap();
        let _ = manager.verify_challenge("a@b.edu", &wrong(&first.code)).await;
        let _ = manager.verify_challenge("a@b.edu", &wrong(&first.code)).await;

        manager.request_challenge("a@b.edu").await.unwrap();
        assert_eq!(store.get("a@b.edu").await.unwrap().unwrap().attempt_count, 0);
    }

    #[tokio::test]
    async fn test_stale_exhausted_record_is_removed() {
        let (manager, store) = manager();
        let issued = manager.request_challenge("a@b.edu").await.unwrap();
        let current = store.get("a@b.edu").await.unwrap().unwrap();
        let over = Challenge {
            attempt_count: 3,
            ..current.clone()
        };
        store.compare_and_swap(&current, Some(over)).await.unwrap();

        assert_eq!(
            manager.verify_challenge("a@b.edu", &issued.code).await.unwrap_err(),
            AuthError::AttemptsExhausted
        );
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_guesses_never_exceed_budget() {
        let (manager, store) = manager();
        let manager = Arc::new(manager);
        let issued = manager.request_challenge("a@b.edu").await.unwrap();
        let bad = wrong(&issued.code);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let manager = manager.clone();
            let bad = bad.clone();
            handles.push(tokio::spawn(async move {
                manager.verify_challenge("a@b.edu", &bad).await.unwrap_err()
            }));
        }

        let mut mismatches = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                AuthError::Mismatch { .. } => mismatches += 1,
                AuthError::AttemptsExhausted => exhausted += 1,
                AuthError::NotFoundOrExpired => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(mismatches, 2);
        assert_eq!(exhausted, 1);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_only_dispatches_code() {
        let store = Arc::new(MemoryChallengeStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = OtpManager::new(
            store,
            issuer(),
            notifier.clone(),
            settings(DisclosureMode::SendOnly),
        );

        let issued = manager.request_challenge("a@b.edu").await.unwrap();
        assert_eq!(issued.disclosed_code(), None);

        // Dispatch runs on a spawned task
        for _ in 0..50 {
            if !notifier.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![("a@b.edu".to_string(), issued.code.clone())]);
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_challenge() {
        let store = Arc::new(MemoryChallengeStore::new());
        let manager = OtpManager::new(
            store.clone(),
            issuer(),
            Arc::new(BrokenNotifier),
            settings(DisclosureMode::SendOnly),
        );

        let issued = manager.request_challenge("a@b.edu").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get("a@b.edu").await.unwrap().is_some());
        assert_ok!(manager.verify_challenge("a@b.edu", &issued.code).await);
    }

    struct DownIssuer;

    #[async_trait]
    impl IdentityIssuer for DownIssuer {
        async fn find_or_create_identity(&self, address: &str) -> anyhow::Result<IdentityRecord> {
            Ok(IdentityRecord {
                id: "id-1".to_string(),
                email: address.to_string(),
                verified: true,
                created_at: 0,
            })
        }

        async fn issue_credential(&self, _identity: &IdentityRecord) -> anyhow::Result<Credential> {
            anyhow::bail!("identity provider timed out")
        }
    }

    #[tokio::test]
    async fn test_issuer_failure_still_consumes_code() {
        let store = Arc::new(MemoryChallengeStore::new());
        let manager = OtpManager::new(
            store.clone(),
            Arc::new(DownIssuer),
            Arc::new(LogNotifier),
            settings(DisclosureMode::Disclose),
        );

        let issued = manager.request_challenge("a@b.edu").await.unwrap();
        let err = assert_err!(manager.verify_challenge("a@b.edu", &issued.code).await);
        assert!(matches!(err, AuthError::IssuerFailure(_)));
        assert!(err.requires_reissue());

        assert!(store.get("a@b.edu").await.unwrap().is_none());
        assert_eq!(
            manager.verify_challenge("a@b.edu", &issued.code).await.unwrap_err(),
            AuthError::NotFoundOrExpired
        );
    }

    #[tokio::test]
    async fn test_verified_identity_is_reused() {
        let (manager, _) = manager();
        let first = manager.request_challenge("a@b.edu").await.unwrap();
        let a = manager.verify_challenge("a@b.edu", &first.code).await.unwrap();

        let second = manager.request_challenge("A@b.edu").await.unwrap();
        let b = manager.verify_challenge("a@B.edu", &second.code).await.unwrap();

        assert_eq!(a.user.id, b.user.id);
    }
}
