//! Application state and shared resources.

use anyhow::Result;
use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::identity::{LocalIssuer, SessionSigner};
use crate::notify::{LogNotifier, Notifier};
use crate::otp::{
    ChallengeStore, MemoryChallengeStore, OtpManager, OtpSettings, RedisChallengeStore,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// OTP challenge lifecycle
    pub otp: Arc<OtpManager>,

    /// Identity issuer (also validates the credentials it minted)
    pub sessions: Arc<LocalIssuer>,
}

impl AppState {
    /// Create new application state, connecting to Redis when configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn ChallengeStore> = match config.store {
            StoreBackend::Memory => {
                tracing::warn!("Using in-process challenge store (single instance only)");
                Arc::new(MemoryChallengeStore::new())
            }
            StoreBackend::Redis => {
                let store = RedisChallengeStore::connect(&config.redis_url).await?;
                tracing::info!("✅ Redis connected: {}", config.redis_url);
                Arc::new(store)
            }
        };

        Self::with_parts(config, store, Arc::new(LogNotifier))
    }

    /// Build state around an existing store and notifier
    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn ChallengeStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let signer = SessionSigner::new(
            &config.session.issuer,
            config.session.ttl_secs,
            config.session.signing_key_path.as_deref(),
        )?;
        let sessions = Arc::new(LocalIssuer::new(signer));

        let settings = OtpSettings {
            ttl_secs: config.otp.ttl_secs,
            max_attempts: config.otp.max_attempts,
            disclosure: config.otp.disclosure,
        };
        let otp = Arc::new(OtpManager::new(store, sessions.clone(), notifier, settings));

        Ok(Self {
            config,
            otp,
            sessions,
        })
    }

    /// The challenge store shared by the manager and the sweeper
    pub fn store(&self) -> Arc<dyn ChallengeStore> {
        self.otp.store().clone()
    }
}
