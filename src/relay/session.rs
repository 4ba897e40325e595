use axum::extract::ws::{close_code, Message};
use chrono::{DateTime, Utc};
use futures_util::Sink;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::auth::Cookies;
use super::delivery::{close_socket, Delivery};
use super::options::RelayOptions;
use super::registry::SessionHandle;
use crate::broker::Broker;
use crate::error::RelayError;
use crate::models::channel::ChannelName;
use crate::models::envelope::{Envelope, SessionId};

/// Lifecycle of a relay session.
///
/// `Created -> [Authenticating] -> Subscribing -> Listening -> Closed`, with
/// `Denied` reachable only from `Authenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Authenticating,
    Subscribing,
    Listening,
    Closed,
    Denied,
}

/// Bridges one client socket to one broker channel.
pub struct RelaySession {
    id: SessionId,
    channel: ChannelName,
    user: Option<String>,
    state: SessionState,
    running: Arc<watch::Sender<bool>>,
    closing: Arc<AtomicBool>,
    connected_at: DateTime<Utc>,
    broker: Arc<dyn Broker>,
    options: Arc<RelayOptions>,
}

impl RelaySession {
    pub fn new(channel: ChannelName, broker: Arc<dyn Broker>, options: Arc<RelayOptions>) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            id: SessionId::generate(),
            channel,
            user: None,
            state: SessionState::Created,
            running: Arc::new(running),
            closing: Arc::new(AtomicBool::new(false)),
            connected_at: Utc::now(),
            broker,
            options,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Receiver that observes the running flag.
    pub fn running_flag(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            channel: self.channel.clone(),
            user: self.user.clone(),
            connected_at: self.connected_at,
            running: self.running.clone(),
            closing: self.closing.clone(),
        }
    }

    /// Resolves once the session has been asked to close.
    async fn closed(&self) {
        let mut flag = self.running.subscribe();
        while !self.closing.load(Ordering::SeqCst) {
            if flag.changed().await.is_err() {
                return;
            }
        }
    }

    async fn abandon_open<S>(&mut self, sink: &mut S) -> RelayError
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        tracing::debug!("session {} closed while opening", self.id);
        self.state = SessionState::Closed;
        close_socket(sink, close_code::AWAY, "").await;
        RelayError::ClosedWhileOpening
    }

    /// Run the open sequence: authenticate, subscribe, start delivery.
    ///
    /// On success the delivery loop is already running on its own task and
    /// its handle is returned. On failure the socket has been sent a close
    /// frame and no subscription is left behind. A close requested through a
    /// [`SessionHandle`] while the gate or the subscribe call is pending
    /// abandons the open.
    pub async fn open<S>(&mut self, cookies: &Cookies, mut sink: S) -> Result<JoinHandle<()>, RelayError>
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
    {
        if let Some(authenticator) = self.options.authenticator.clone() {
            self.state = SessionState::Authenticating;
            let outcome = tokio::select! {
                user = authenticator.authenticate(cookies) => Some(user),
                _ = self.closed() => None,
            };
            match outcome {
                None => return Err(self.abandon_open(&mut sink).await),
                Some(Some(user)) => self.user = Some(user),
                Some(None) => {
                    tracing::error!(
                        "authentication failed for session {} on channel {}",
                        self.id,
                        self.channel
                    );
                    self.state = SessionState::Denied;
                    close_socket(&mut sink, close_code::POLICY, "authentication failed").await;
                    return Err(RelayError::AuthenticationDenied);
                }
            }
        }

        self.state = SessionState::Subscribing;
        let outcome = tokio::select! {
            result = self.broker.subscribe(&self.channel) => Some(result),
            _ = self.closed() => None,
        };
        let mut subscription = match outcome {
            None => return Err(self.abandon_open(&mut sink).await),
            Some(Ok(subscription)) => subscription,
            Some(Err(e)) => {
                tracing::error!("session {} could not subscribe: {e}", self.id);
                self.state = SessionState::Closed;
                close_socket(&mut sink, close_code::ERROR, "").await;
                return Err(e);
            }
        };

        self.running.send_replace(true);
        if self.closing.load(Ordering::SeqCst) {
            self.running.send_replace(false);
            subscription.unsubscribe();
            return Err(self.abandon_open(&mut sink).await);
        }
        self.state = SessionState::Listening;
        match &self.user {
            Some(user) => tracing::info!(
                "connection established on channel {} for user: {user}",
                self.channel
            ),
            None => tracing::info!("connection established on channel {}", self.channel),
        }

        let delivery = Delivery {
            session: self.id,
            subscription,
            sink,
            running: self.running.clone(),
            observer: self.options.observer.clone(),
            mode: self.options.delivery,
        };
        Ok(tokio::spawn(delivery.run()))
    }

    /// Publish one client message to the session's channel.
    ///
    /// A failed publish drops that message only; the session stays open.
    pub async fn on_message(&self, message: String) {
        if self.state != SessionState::Listening {
            tracing::debug!("ignoring message for session {} in {:?}", self.id, self.state);
            return;
        }
        let payload = match Envelope::new(self.id, message).encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to encode envelope for session {}: {e}", self.id);
                return;
            }
        };
        if let Err(e) = self.broker.publish(&self.channel, payload).await {
            tracing::error!("dropping message from session {}: {e}", self.id);
        }
    }

    /// Stop the session. Idempotent; the delivery loop releases the
    /// subscription once it observes the cleared flag.
    pub fn close(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.running.send_replace(false);
        match self.state {
            SessionState::Closed => return,
            SessionState::Denied => {}
            _ => self.state = SessionState::Closed,
        }

        let seconds = (Utc::now() - self.connected_at).num_seconds();
        match &self.user {
            Some(user) => tracing::info!(
                "connection for user: {user} closed after {seconds}s (channel {})",
                self.channel
            ),
            None => tracing::info!(
                "connection closed after {seconds}s (channel {})",
                self.channel
            ),
        }
    }
}
