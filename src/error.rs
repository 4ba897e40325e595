use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum RelayError {
    /// Route segment is not a valid channel name.
    InvalidChannel(String),
    /// Origin hostname is not in the allow-list.
    OriginDenied(String),
    /// Authentication gate resolved no identity.
    AuthenticationDenied,
    /// Broker refused or failed the subscribe call.
    Subscribe(redis::RedisError),
    /// Publishing one inbound client message failed.
    Publish(redis::RedisError),
    /// Writing to the client socket failed.
    DeliveryWrite(String),
    /// The broker stream behind a subscription has ended.
    SubscriptionClosed,
    /// The session was closed before it finished opening.
    ClosedWhileOpening,
    Broker(redis::RedisError),
    Codec(serde_json::Error),
    Io(std::io::Error),
}

impl RelayError {
    fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidChannel(_) => "not_found",
            RelayError::OriginDenied(_) => "forbidden",
            RelayError::AuthenticationDenied => "unauthorized",
            RelayError::Subscribe(_)
            | RelayError::Publish(_)
            | RelayError::DeliveryWrite(_)
            | RelayError::SubscriptionClosed
            | RelayError::ClosedWhileOpening
            | RelayError::Broker(_)
            | RelayError::Codec(_)
            | RelayError::Io(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidChannel(_) => StatusCode::NOT_FOUND,
            RelayError::OriginDenied(_) => StatusCode::FORBIDDEN,
            RelayError::AuthenticationDenied => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            RelayError::InvalidChannel(_) => "unknown channel".to_string(),
            RelayError::OriginDenied(_) => "origin not allowed".to_string(),
            RelayError::AuthenticationDenied => "authentication failed".to_string(),
            other => {
                tracing::error!("relay error: {other}");
                "internal server error".to_string()
            }
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::InvalidChannel(raw) => write!(f, "invalid channel name {raw:?}"),
            RelayError::OriginDenied(host) => write!(f, "domain {host:?} not allowed"),
            RelayError::AuthenticationDenied => f.write_str("authentication failed"),
            RelayError::Subscribe(e) => write!(f, "subscribe failed: {e}"),
            RelayError::Publish(e) => write!(f, "publish failed: {e}"),
            RelayError::DeliveryWrite(e) => write!(f, "socket write failed: {e}"),
            RelayError::SubscriptionClosed => f.write_str("broker subscription closed"),
            RelayError::ClosedWhileOpening => f.write_str("session closed while opening"),
            RelayError::Broker(e) => write!(f, "broker error: {e}"),
            RelayError::Codec(e) => write!(f, "envelope codec error: {e}"),
            RelayError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Subscribe(e) | RelayError::Publish(e) | RelayError::Broker(e) => Some(e),
            RelayError::Codec(e) => Some(e),
            RelayError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(e: redis::RedisError) -> Self {
        RelayError::Broker(e)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Codec(e)
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(e)
    }
}
