use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use super::{Broker, Subscription};
use crate::error::RelayError;
use crate::models::channel::ChannelName;

/// Redis pub/sub backed broker.
///
/// Publishing goes through one multiplexed connection shared by every
/// session. Each subscription gets its own pub/sub connection, since Redis
/// puts a connection into subscriber mode.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisBroker {
    /// Connect to `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, RelayError> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription, RelayError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(RelayError::Subscribe)?;
        pubsub
            .subscribe(channel.as_str())
            .await
            .map_err(RelayError::Subscribe)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let topic = channel.clone();
        tokio::spawn(async move {
            {
                let mut messages = pubsub.on_message();
                loop {
                    tokio::select! {
                        msg = messages.next() => {
                            let Some(msg) = msg else {
                                tracing::warn!("redis pub/sub stream ended on channel {topic}");
                                break;
                            };
                            match msg.get_payload::<String>() {
                                Ok(payload) => {
                                    if tx.send(payload).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("non-text payload on channel {topic}: {e}");
                                }
                            }
                        }
                        _ = tx.closed() => break,
                    }
                }
            }
            if let Err(e) = pubsub.unsubscribe(topic.as_str()).await {
                tracing::debug!("redis unsubscribe from {topic} failed: {e}");
            }
        });

        Ok(Subscription::new(channel.clone(), rx))
    }

    async fn publish(&self, channel: &ChannelName, payload: String) -> Result<(), RelayError> {
        let mut conn = self.publisher.clone();
        let _receivers: i64 = conn
            .publish(channel.as_str(), payload)
            .await
            .map_err(RelayError::Publish)?;
        Ok(())
    }
}
