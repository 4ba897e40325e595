use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity stamped on everything a relay session publishes.
///
/// Random rather than counter-based so that several relay processes sharing
/// one broker never hand out the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Wire record published to the broker: `{"senderId": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub sender_id: SessionId,
    pub message: String,
}

impl Envelope {
    pub fn new(sender_id: SessionId, message: impl Into<String>) -> Self {
        Self {
            sender_id,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// True when this envelope was published by `session`.
    pub fn is_from(&self, session: SessionId) -> bool {
        self.sender_id == session
    }
}
