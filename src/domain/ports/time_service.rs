use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Clock and timer used by the connection manager and optimistic sends
#[async_trait]
pub trait TimeService: Send + Sync {
    /// Wall-clock time stamped on optimistic messages
    fn now(&self) -> DateTime<Utc>;

    /// Reconnect delay timer
    async fn sleep(&self, duration: Duration);
}
