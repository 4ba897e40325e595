use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::models::channel::ChannelName;
use crate::models::envelope::SessionId;

/// Supervisor-side view of one live relay session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub channel: ChannelName,
    pub user: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub(crate) running: Arc<watch::Sender<bool>>,
    pub(crate) closing: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Ask the session to stop. Both of its loops notice on their next turn;
    /// a session still opening gives up instead of starting delivery.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.running.send_replace(false);
    }
}

/// Live sessions owned by the connection supervisor.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: SessionHandle) {
        tracing::debug!(
            "registered session {} on channel {} ({} live)",
            handle.id,
            handle.channel,
            self.sessions.len() + 1
        );
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    /// Record the identity a session authenticated as.
    pub fn set_user(&self, id: SessionId, user: Option<String>) {
        if let Some(mut handle) = self.sessions.get_mut(&id) {
            handle.user = user;
        }
    }

    /// Copy of every live session handle.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Live sessions per channel, keyed by channel name.
    pub fn channel_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.sessions.iter() {
            *counts.entry(entry.value().channel.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Force-close every live session. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.sessions.iter() {
            entry.value().close();
            closed += 1;
        }
        if closed > 0 {
            tracing::info!("force-closing {closed} live session(s)");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(channel: &str) -> SessionHandle {
        let (tx, _) = watch::channel(true);
        SessionHandle {
            id: SessionId::generate(),
            channel: ChannelName::parse(channel).unwrap(),
            user: None,
            connected_at: Utc::now(),
            running: Arc::new(tx),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        let h = handle("1");
        let id = h.id;
        registry.register(h);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].id, id);
        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_channel_counts() {
        let registry = SessionRegistry::new();
        assert!(registry.channel_counts().is_empty());
        registry.register(handle("1"));
        registry.register(handle("1"));
        registry.register(handle("2"));

        let counts = registry.channel_counts();
        assert_eq!(counts.get("1"), Some(&2));
        assert_eq!(counts.get("2"), Some(&1));
        assert_eq!(counts.get("3"), None);
        assert_eq!(registry.snapshot().len(), 3);
    }

    #[test]
    fn test_set_user_updates_registered_handle() {
        let registry = SessionRegistry::new();
        let h = handle("1");
        let id = h.id;
        registry.register(h);
        registry.set_user(id, Some("test user".to_string()));
        assert_eq!(registry.snapshot()[0].user.as_deref(), Some("test user"));

        registry.remove(id);
        registry.set_user(id, Some("ghost".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all_flips_running_flags() {
        let registry = SessionRegistry::new();
        let a = handle("1");
        let b = handle("2");
        registry.register(a.clone());
        registry.register(b.clone());
        assert!(a.is_running() && b.is_running());

        assert_eq!(registry.close_all(), 2);
        assert!(!a.is_running());
        assert!(!b.is_running());
        assert!(a.closing.load(Ordering::SeqCst));
    }
}
