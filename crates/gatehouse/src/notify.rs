//! Outbound code delivery.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Channel that delivers an issued code to the owner of an address.
///
/// Sends are fire-and-forget: a failure never rolls back issuance.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, code: &str) -> Result<()>;
}

/// Notifier that only records the dispatch in the log (never the code)
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, address: &str, _code: &str) -> Result<()> {
        info!(to_email = %address, template = "otp", "email send stub");
        Ok(())
    }
}
