pub mod auth;
pub mod delivery;
pub mod options;
pub mod origin;
pub mod registry;
pub mod session;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::ORIGIN;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use crate::error::RelayError;
use crate::models::channel::ChannelName;
use crate::state::AppState;
use auth::Cookies;
use session::RelaySession;

pub use options::{DeliveryMode, MessageObserver, RelayOptions};

/// `GET /handler/{channel}`: gate the upgrade, then hand the socket to a
/// relay session.
pub async fn ws_upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, RelayError> {
    let channel = ChannelName::parse(&channel)?;

    // Browsers always send Origin; other clients are not origin-checked.
    if let Some(origin) = headers.get(ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !origin::allowed(origin, &state.options.allowed_origins) {
            return Err(RelayError::OriginDenied(origin::hostname(origin)));
        }
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let cookies = Cookies::from_headers(&headers);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, channel, cookies, state)))
}

async fn handle_socket(socket: WebSocket, channel: ChannelName, cookies: Cookies, state: AppState) {
    let (sink, mut stream) = socket.split();
    let mut session = RelaySession::new(channel, state.broker.clone(), state.options.clone());
    tracing::info!("opening new connection on channel {}", session.channel());

    // Registered before opening so shutdown reaches sessions still in the gate.
    state.sessions.register(session.handle());
    let delivery = match session.open(&cookies, sink).await {
        Ok(delivery) => delivery,
        Err(e) => {
            tracing::debug!("session {} did not open: {e}", session.id());
            session.close();
            state.sessions.remove(session.id());
            return;
        }
    };
    state
        .sessions
        .set_user(session.id(), session.user().map(str::to_string));

    let mut running = session.running_flag();
    loop {
        if !*running.borrow_and_update() {
            break;
        }
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.on_message(text.to_string()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => session.on_message(text).await,
                        Err(_) => {
                            tracing::debug!("dropping non-utf8 binary frame from session {}", session.id());
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("socket error on session {}: {e}", session.id());
                        break;
                    }
                    _ => {}
                }
            }
            changed = running.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    session.close();
    if let Err(e) = delivery.await {
        tracing::error!("delivery task for session {} failed: {e}", session.id());
    }
    state.sessions.remove(session.id());
}
