use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Broker, Subscription};
use crate::error::RelayError;
use crate::models::channel::ChannelName;

type Subscribers = HashMap<u64, mpsc::UnboundedSender<String>>;

/// In-process broker for single-node deployments and tests.
///
/// A channel's entry lives only while it has subscribers; each subscription
/// removes its own slot when released.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    channels: Arc<DashMap<ChannelName, Subscribers>>,
    next_id: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscriptions on `channel` that have not been released.
    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        self.channels
            .get(channel)
            .map(|subs| subs.values().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of channels with at least one subscriber slot.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Drop every subscription on `channel`, as if the broker went away.
    pub fn close_channel(&self, channel: &ChannelName) {
        if let Some((_, subs)) = self.channels.remove(channel) {
            tracing::debug!(
                "closed {} subscription(s) on channel {channel}",
                subs.len()
            );
        }
    }
}

fn release_slot(channels: &DashMap<ChannelName, Subscribers>, channel: &ChannelName, id: u64) {
    if let Some(mut subs) = channels.get_mut(channel) {
        subs.remove(&id);
    }
    channels.remove_if(channel, |_, subs| subs.is_empty());
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription, RelayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .entry(channel.clone())
            .or_default()
            .insert(id, tx);

        let channels = Arc::clone(&self.channels);
        let topic = channel.clone();
        Ok(Subscription::new(channel.clone(), rx)
            .with_release(move || release_slot(&channels, &topic, id)))
    }

    async fn publish(&self, channel: &ChannelName, payload: String) -> Result<(), RelayError> {
        let emptied = match self.channels.get_mut(channel) {
            Some(mut subs) => {
                subs.retain(|_, tx| tx.send(payload.clone()).is_ok());
                subs.is_empty()
            }
            None => false,
        };
        if emptied {
            self.channels.remove_if(channel, |_, subs| subs.is_empty());
        }
        Ok(())
    }
}
