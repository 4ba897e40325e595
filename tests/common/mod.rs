#![allow(dead_code)]

use fanrelay::broker::MemoryBroker;
use fanrelay::models::channel::ChannelName;
use fanrelay::relay::RelayOptions;
use fanrelay::routes;
use fanrelay::server;
use fanrelay::state::AppState;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a client waits before deciding nothing is coming.
pub const QUIET: Duration = Duration::from_millis(300);

/// Relay wired to an in-process broker. Each instance is isolated, so tests
/// can run in parallel.
pub struct TestServer {
    pub broker: Arc<MemoryBroker>,
    pub state: AppState,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_options(RelayOptions::default())
    }

    pub fn with_options(options: RelayOptions) -> Self {
        let broker = Arc::new(MemoryBroker::new());
        let state = AppState::new(broker.clone(), options);
        Self { broker, state }
    }

    /// Router for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone(), None)
    }

    /// Bind on port 0, serve in the background and return the `ws://` base URL.
    pub async fn spawn(&self) -> String {
        self.spawn_until(std::future::pending()).await
    }

    /// Like [`spawn`](Self::spawn), also returning a trigger that shuts the
    /// server down.
    pub async fn spawn_with_shutdown(&self) -> (String, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel::<()>();
        let url = self
            .spawn_until(async move {
                let _ = rx.await;
            })
            .await;
        (url, tx)
    }

    async fn spawn_until(
        &self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = self.state.clone();
        tokio::spawn(async move {
            server::serve(listener, state, None, shutdown).await.unwrap();
        });
        format!("ws://127.0.0.1:{}", addr.port())
    }

    pub fn subscribers(&self, channel: &str) -> usize {
        self.broker
            .subscriber_count(&ChannelName::parse(channel).unwrap())
    }

    /// Wait until `channel` has exactly `n` live subscriptions.
    pub async fn wait_for_subscribers(&self, channel: &str, n: usize) {
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            while self.subscribers(channel) != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            reached.is_ok(),
            "channel {channel} has {} subscriber(s), expected {n}",
            self.subscribers(channel)
        );
    }

    pub fn sessions_on(&self, channel: &str) -> usize {
        self.state
            .sessions
            .channel_counts()
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Wait until exactly `n` sessions on `channel` are registered.
    pub async fn wait_for_sessions(&self, channel: &str, n: usize) {
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            while self.sessions_on(channel) != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            reached.is_ok(),
            "channel {channel} has {} session(s), expected {n}",
            self.sessions_on(channel)
        );
    }

    /// Wait until every registered session carries an authenticated user.
    pub async fn wait_for_users(&self) {
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            while self.state.sessions.snapshot().iter().any(|s| s.user.is_none()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "sessions still missing their user");
    }

    /// Wait until no session is registered.
    pub async fn wait_for_no_sessions(&self) {
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            while !self.state.sessions.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "{} session(s) still live", self.state.sessions.len());
    }
}

/// Connect a client to `/handler/{channel}`.
pub async fn connect(base: &str, channel: &str) -> WsClient {
    let (ws, _) = connect_async(format!("{base}/handler/{channel}"))
        .await
        .expect("websocket handshake failed");
    ws
}

/// Connect with extra request headers (e.g. `Cookie`, `Origin`).
pub async fn connect_with_headers(
    base: &str,
    channel: &str,
    headers: &[(&'static str, &str)],
) -> Result<WsClient, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("{base}/handler/{channel}")
        .into_client_request()
        .unwrap();
    for (name, value) in headers {
        request
            .headers_mut()
            .insert(*name, value.parse().unwrap());
    }
    connect_async(request).await.map(|(ws, _)| ws)
}

/// Next text frame, or `None` if the socket closes or stays quiet for `QUIET`.
pub async fn recv_text(ws: &mut WsClient) -> Option<String> {
    recv_text_within(ws, QUIET).await
}

pub async fn recv_text_within(ws: &mut WsClient, wait: Duration) -> Option<String> {
    loop {
        let next = tokio::time::timeout(wait, ws.next()).await.ok()??;
        match next {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            _ => return None,
        }
    }
}

/// True once the server has closed the socket (close frame, EOF or error).
pub async fn closed_by_server(ws: &mut WsClient) -> bool {
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => return false,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return true,
                _ => continue,
            }
        }
    })
    .await;
    outcome.unwrap_or(false)
}
