//! Configuration management for Gatehouse.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use quad_common::DisclosureMode;
use quad_common::constants::{
    DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, DEFAULT_SESSION_ISSUER, DEFAULT_SESSION_TTL_SECS,
    OTP_MAX_ATTEMPTS, OTP_SWEEP_INTERVAL_SECS, OTP_TTL_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL (used when `store = "redis"`)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Challenge store backend
    #[serde(default)]
    pub store: StoreBackend,

    /// OTP configuration
    #[serde(default)]
    pub otp: OtpConfig,

    /// Session credential configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// HTTP layer configuration
    #[serde(default)]
    pub http: HttpConfig,
}

/// Where pending challenges live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map (single instance only)
    #[default]
    Memory,
    /// Shared Redis (multi-instance)
    Redis,
}

/// OTP-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Challenge validity in seconds
    #[serde(default = "default_otp_ttl")]
    pub ttl_secs: u64,

    /// Failed verifications allowed per challenge
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds between expired-challenge sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Return the code to the caller (`disclose`) or only send it (`send_only`)
    #[serde(default)]
    pub disclosure: DisclosureMode,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_otp_ttl(),
            max_attempts: default_max_attempts(),
            sweep_interval_secs: default_sweep_interval(),
            disclosure: DisclosureMode::default(),
        }
    }
}

/// Session credential configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Issuer claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Credential validity in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Path to a 32-byte ed25519 seed (ephemeral key if unset)
    #[serde(default)]
    pub signing_key_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            ttl_secs: default_session_ttl(),
            signing_key_path: None,
        }
    }
}

/// HTTP layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// CORS origins (empty allows any)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            allowed_origins: Vec::new(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_otp_ttl() -> u64 { OTP_TTL_SECS }
fn default_max_attempts() -> u32 { OTP_MAX_ATTEMPTS }
fn default_sweep_interval() -> u64 { OTP_SWEEP_INTERVAL_SECS }
fn default_issuer() -> String { DEFAULT_SESSION_ISSUER.to_string() }
fn default_session_ttl() -> u64 { DEFAULT_SESSION_TTL_SECS }
fn default_request_timeout() -> u64 { 10 }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(store) = args.store {
            config.store = store;
        }
        if let Some(disclosure) = args.disclosure {
            config.otp.disclosure = disclosure;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(config_path: &str) -> Result<Self> {
        if !Path::new(config_path).exists() {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .build()
            .context("Failed to load config file")?;

        settings
            .try_deserialize()
            .context("Failed to parse config")
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.otp.ttl_secs > 0, "otp.ttl_secs must be positive");
        anyhow::ensure!(self.otp.max_attempts > 0, "otp.max_attempts must be positive");
        anyhow::ensure!(
            self.otp.sweep_interval_secs > 0,
            "otp.sweep_interval_secs must be positive"
        );
        anyhow::ensure!(self.session.ttl_secs > 0, "session.ttl_secs must be positive");
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            store: StoreBackend::default(),
            otp: OtpConfig::default(),
            session: SessionConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
