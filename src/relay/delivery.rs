use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes};
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::options::{DeliveryMode, MessageObserver};
use crate::broker::Subscription;
use crate::error::RelayError;
use crate::models::envelope::{Envelope, SessionId};

/// The per-session task that drains a subscription into the client socket.
pub(crate) struct Delivery<S> {
    pub session: SessionId,
    pub subscription: Subscription,
    pub sink: S,
    pub running: Arc<watch::Sender<bool>>,
    pub observer: Option<MessageObserver>,
    pub mode: DeliveryMode,
}

impl<S> Delivery<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    pub async fn run(mut self) {
        let mut running = self.running.subscribe();
        let outcome = match self.mode {
            DeliveryMode::Push => self.push_loop(&mut running).await,
            DeliveryMode::Poll(interval) => self.poll_loop(&mut running, interval).await,
        };

        self.subscription.unsubscribe();
        self.running.send_replace(false);

        let code = match &outcome {
            Ok(()) => close_code::AWAY,
            Err(e) => {
                tracing::warn!("delivery for session {} stopped: {e}", self.session);
                close_code::ERROR
            }
        };
        close_socket(&mut self.sink, code, "").await;
    }

    async fn push_loop(&mut self, running: &mut watch::Receiver<bool>) -> Result<(), RelayError> {
        loop {
            if !*running.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                changed = running.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                envelope = self.subscription.recv() => {
                    self.deliver(envelope?).await?;
                }
            }
        }
    }

    async fn poll_loop(
        &mut self,
        running: &mut watch::Receiver<bool>,
        interval: Duration,
    ) -> Result<(), RelayError> {
        loop {
            if !*running.borrow_and_update() {
                return Ok(());
            }
            while let Some(envelope) = self.subscription.poll()? {
                self.deliver(envelope).await?;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = running.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn deliver(&mut self, envelope: Envelope) -> Result<(), RelayError> {
        if envelope.is_from(self.session) {
            tracing::trace!("suppressed echo for session {}", self.session);
            return Ok(());
        }

        self.sink
            .send(Message::Text(envelope.message.clone().into()))
            .await
            .map_err(|e| RelayError::DeliveryWrite(e.to_string()))?;

        if let Some(observer) = &self.observer {
            observer(&envelope.message);
        }
        Ok(())
    }
}

/// Best-effort close frame followed by closing the sink.
pub(crate) async fn close_socket<S>(sink: &mut S, code: u16, reason: &'static str)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!("close frame not sent: {e}");
    }
    let _ = sink.close().await;
}
