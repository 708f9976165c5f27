//! Alert strategies, invoked by the monitor when a target changes status.

use anyhow::Result;
use tracing::warn;

use crate::config::Options;

pub mod email;

pub use email::EmailAlerter;

/// Notifies a human about a status transition.
///
/// Delivery failures are returned to the caller, which logs them. They never
/// stop the monitor.
#[async_trait::async_trait]
pub trait Alerter: Send + Sync {
    async fn send_alert(&self, target: &str, host: &str, message: &str, options: &Options) -> Result<()>;
}

/// Emits the alert as a log event
pub struct LogAlerter;

#[async_trait::async_trait]
impl Alerter for LogAlerter {
    async fn send_alert(&self, target: &str, host: &str, message: &str, _options: &Options) -> Result<()> {
        warn!(target_name = target, host, "{message}");
        Ok(())
    }
}
