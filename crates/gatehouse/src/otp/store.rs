//! Challenge storage.
//!
//! The manager only ever changes a stored challenge through
//! `compare_and_swap` against the exact record it read, so every backend must
//! make that operation atomic per identity.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quad_common::Challenge;

/// Keyed store of pending challenges, one per identity.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Fetch the challenge for an identity (if any)
    async fn get(&self, identity: &str) -> Result<Option<Challenge>>;

    /// Insert or overwrite the challenge for `challenge.identity`
    async fn put(&self, challenge: Challenge) -> Result<()>;

    /// Replace `expected` with `next` (`None` removes it).
    ///
    /// Returns false, changing nothing, if the stored record is no longer
    /// equal to `expected`.
    async fn compare_and_swap(&self, expected: &Challenge, next: Option<Challenge>)
    -> Result<bool>;

    /// Remove every challenge expired at `now`, returning how many were removed
    async fn purge_expired(&self, now: i64) -> Result<usize>;

    /// Number of pending challenges
    async fn len(&self) -> Result<usize>;

    /// Backend reachability check
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Short backend name for status endpoints
    fn backend(&self) -> &'static str;
}

/// Single-process store on a sharded concurrent map.
///
/// Per-identity operations lock only the shard holding that key.
#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    challenges: DashMap<String, Challenge>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn get(&self, identity: &str) -> Result<Option<Challenge>> {
        Ok(self.challenges.get(identity).map(|entry| entry.value().clone()))
    }

    async fn put(&self, challenge: Challenge) -> Result<()> {
        self.challenges.insert(challenge.identity.clone(), challenge);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: &Challenge,
        next: Option<Challenge>,
    ) -> Result<bool> {
        debug_assert!(next.as_ref().is_none_or(|c| c.identity == expected.identity));

        match self.challenges.entry(expected.identity.clone()) {
            Entry::Occupied(mut slot) if slot.get() == expected => {
                match next {
                    Some(challenge) => {
                        slot.insert(challenge);
                    }
                    None => {
                        slot.remove();
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        // Scan under shared shard locks, then remove one key at a time
        let expired: Vec<String> = self
            .challenges
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for identity in expired {
            // Re-check: the identity may have been re-issued since the scan
            if self
                .challenges
                .remove_if(&identity, |_, challenge| challenge.is_expired_at(now))
                .is_some()
            {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.challenges.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(identity: &str, challenge_id: &str, expires_at: i64) -> Challenge {
        Challenge {
            identity: identity.to_string(),
            challenge_id: challenge_id.to_string(),
            code_hash: "hash".to_string(),
            issued_at: expires_at - 300,
            expires_at,
            attempt_count: 0,
        }
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_challenge() {
        let store = MemoryChallengeStore::new();
        store.put(challenge("a@b.edu", "first", 1_300)).await.unwrap();
        store.put(challenge("a@b.edu", "second", 1_400)).await.unwrap();

        let current = store.get("a@b.edu").await.unwrap().unwrap();
        assert_eq!(current.challenge_id, "second");
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_record() {
        let store = MemoryChallengeStore::new();
        let first = challenge("a@b.edu", "first", 1_300);
        store.put(first.clone()).await.unwrap();

        let bumped = first.with_failed_attempt();
        assert!(store.compare_and_swap(&first, Some(bumped.clone())).await.unwrap());

        // `first` is stale now
        assert!(!store.compare_and_swap(&first, None).await.unwrap());
        assert_eq!(store.get("a@b.edu").await.unwrap(), Some(bumped.clone()));

        assert!(store.compare_and_swap(&bumped, None).await.unwrap());
        assert_eq!(store.get("a@b.edu").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_compare_and_swap_on_missing_identity() {
        let store = MemoryChallengeStore::new();
        let ghost = challenge("ghost@b.edu", "x", 1_300);
        assert!(!store.compare_and_swap(&ghost, None).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let store = MemoryChallengeStore::new();
        store.put(challenge("old@b.edu", "o", 1_000)).await.unwrap();
        store.put(challenge("edge@b.edu", "e", 1_100)).await.unwrap();
        store.put(challenge("new@b.edu", "n", 2_000)).await.unwrap();

        assert_eq!(store.purge_expired(1_100).await.unwrap(), 1);
        assert_eq!(store.purge_expired(1_100).await.unwrap(), 0);

        assert!(store.get("old@b.edu").await.unwrap().is_none());
        assert!(store.get("edge@b.edu").await.unwrap().is_some());
        assert!(store.get("new@b.edu").await.unwrap().is_some());
    }
}
