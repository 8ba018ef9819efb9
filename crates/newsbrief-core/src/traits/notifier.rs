//! Outbound channel sender trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DeliveryChannel, OutgoingMessage};

/// Sends one rendered brief to one destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Which delivery channel this sender serves.
    fn channel(&self) -> DeliveryChannel;

    async fn send(&self, message: &OutgoingMessage) -> Result<()>;
}
