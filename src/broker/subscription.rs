use std::fmt;
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::models::channel::ChannelName;
use crate::models::envelope::Envelope;

/// One broker subscription for one channel, owned by exactly one session.
///
/// Broker backends push raw payloads into the receiver. A backend either
/// notices the receiver closing or registers a release hook that runs once
/// on unsubscribe.
pub struct Subscription {
    channel: ChannelName,
    rx: mpsc::UnboundedReceiver<String>,
    released: bool,
    on_release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(channel: ChannelName, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            channel,
            rx,
            released: false,
            on_release: None,
        }
    }

    /// Run `release` exactly once when this subscription is let go.
    pub fn with_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Next envelope if one is already waiting; never suspends.
    ///
    /// Returns `Ok(None)` when nothing is pending and
    /// [`RelayError::SubscriptionClosed`] once the broker side is gone.
    pub fn poll(&mut self) -> Result<Option<Envelope>, RelayError> {
        loop {
            match self.rx.try_recv() {
                Ok(raw) => {
                    if let Some(envelope) = self.decode(&raw) {
                        return Ok(Some(envelope));
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(RelayError::SubscriptionClosed)
                }
            }
        }
    }

    /// Park until the next envelope arrives.
    pub async fn recv(&mut self) -> Result<Envelope, RelayError> {
        loop {
            let raw = self.rx.recv().await.ok_or(RelayError::SubscriptionClosed)?;
            if let Some(envelope) = self.decode(&raw) {
                return Ok(envelope);
            }
        }
    }

    /// Release the broker subscription. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.rx.close();
        if let Some(release) = self.on_release.take() {
            release();
        }
        tracing::debug!("unsubscribed from channel {}", self.channel);
    }

    fn decode(&self, raw: &str) -> Option<Envelope> {
        match Envelope::decode(raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(
                    "dropping malformed payload on channel {}: {e}",
                    self.channel
                );
                None
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
