//! Background removal of expired challenges.
//!
//! Verification re-checks expiry on its own, so the sweep only bounds how
//! long dead challenges occupy the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::store::ChallengeStore;

/// Owned handle to a running sweeper task
pub struct SweeperHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Start sweeping `store` every `interval`
    pub fn spawn(store: Arc<dyn ChallengeStore>, interval: Duration) -> Self {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(sweeper_worker(store, interval, shutdown_rx));
        Self { shutdown, task }
    }

    /// Signal the task and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Sweeper task failed");
        }
    }
}

/// Run one sweep at the current time
pub async fn sweep_once(store: &dyn ChallengeStore) -> Result<usize> {
    let removed = store.purge_expired(chrono::Utc::now().timestamp()).await?;
    if removed > 0 {
        tracing::debug!(removed = removed, "Swept expired OTP challenges");
    }
    Ok(removed)
}

async fn sweeper_worker(
    store: Arc<dyn ChallengeStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "🧹 OTP sweeper started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(store.as_ref()).await {
                    tracing::error!(error = %e, "OTP sweep failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 OTP sweeper shutting down...");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::MemoryChallengeStore;
    use quad_common::Challenge;

    fn challenge(identity: &str, expires_at: i64) -> Challenge {
        Challenge {
            identity: identity.to_string(),
            challenge_id: identity.to_string(),
            code_hash: "hash".to_string(),
            issued_at: expires_at - 300,
            expires_at,
            attempt_count: 0,
        }
    }

    #[tokio::test]
    async fn test_sweep_once_leaves_live_entries() {
        let store = MemoryChallengeStore::new();
        let now = chrono::Utc::now().timestamp();
        store.put(challenge("old@b.edu", now - 10)).await.unwrap();
        store.put(challenge("live@b.edu", now + 300)).await.unwrap();

        assert_eq!(sweep_once(&store).await.unwrap(), 1);
        for _ in 0..5 {
            assert_eq!(sweep_once(&store).await.unwrap(), 0);
        }
        assert!(store.get("live@b.edu").await.unwrap().is_some());
        assert!(store.get("old@b.edu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_background_sweeper_purges_and_stops() {
        let store = Arc::new(MemoryChallengeStore::new());
        let now = chrono::Utc::now().timestamp();
        store.put(challenge("old@b.edu", now - 10)).await.unwrap();
        store.put(challenge("live@b.edu", now + 300)).await.unwrap();

        let handle = SweeperHandle::spawn(store.clone(), Duration::from_millis(10));

        for _ in 0..100 {
            if store.len().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        handle.stop().await;
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.get("live@b.edu").await.unwrap().is_some());
    }
}
