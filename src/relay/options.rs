use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::auth::Authenticator;
use crate::config::Config;

/// Side observer invoked with every payload delivered to a socket.
pub type MessageObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// How a session's delivery loop waits for broker messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Park on the subscription until a message or a close arrives.
    #[default]
    Push,
    /// Check the subscription, then sleep for the interval.
    Poll(Duration),
}

/// Per-connection behaviour shared by every relay session.
#[derive(Clone)]
pub struct RelayOptions {
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub allowed_origins: HashSet<String>,
    pub observer: Option<MessageObserver>,
    pub delivery: DeliveryMode,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            authenticator: None,
            allowed_origins: HashSet::from(["localhost".to_string()]),
            observer: None,
            delivery: DeliveryMode::Push,
        }
    }
}

impl RelayOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            delivery: config
                .poll_interval
                .map(DeliveryMode::Poll)
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Replace the allow-list. An empty list falls back to `localhost`.
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let origins: HashSet<String> = origins.into_iter().map(Into::into).collect();
        if !origins.is_empty() {
            self.allowed_origins = origins;
        }
        self
    }

    pub fn with_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }
}

impl fmt::Debug for RelayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayOptions")
            .field("authenticator", &self.authenticator.is_some())
            .field("allowed_origins", &self.allowed_origins)
            .field("observer", &self.observer.is_some())
            .field("delivery", &self.delivery)
            .finish()
    }
}
