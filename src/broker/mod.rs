pub mod memory;
pub mod redis_pubsub;
pub mod subscription;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::models::channel::ChannelName;

pub use memory::MemoryBroker;
pub use redis_pubsub::RedisBroker;
pub use subscription::Subscription;

/// Channel-addressed publish/subscribe service the relay fans out through.
///
/// Delivery is at-least-once to whoever is subscribed at publish time; there
/// is no persistence and no replay for late subscribers.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Open an exclusively owned subscription on `channel`.
    ///
    /// Failures come back as [`RelayError::Subscribe`].
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription, RelayError>;

    /// Publish one already-encoded envelope on `channel`.
    ///
    /// Failures come back as [`RelayError::Publish`].
    async fn publish(&self, channel: &ChannelName, payload: String) -> Result<(), RelayError>;
}
