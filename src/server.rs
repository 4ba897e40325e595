use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::broker::{Broker, MemoryBroker, RedisBroker};
use crate::config::{BrokerBackend, Config};
use crate::error::RelayError;
use crate::relay::RelayOptions;
use crate::routes;
use crate::state::AppState;

pub async fn connect_broker(config: &Config) -> Result<Arc<dyn Broker>, RelayError> {
    match config.broker {
        BrokerBackend::Redis => {
            let url = config.redis.url();
            let broker = RedisBroker::connect(&url).await?;
            tracing::info!("connected to redis at {url}");
            Ok(Arc::new(broker))
        }
        BrokerBackend::Memory => {
            tracing::info!("using in-process memory broker");
            Ok(Arc::new(MemoryBroker::new()))
        }
    }
}

/// Serve the relay on `listener` until `shutdown` resolves, then force-close
/// every live session.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    extra_routes: Option<Router>,
    shutdown: F,
) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sessions = state.sessions.clone();
    let app = routes::router(state, extra_routes);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            sessions.close_all();
        })
        .await?;
    Ok(())
}

/// Connect the broker, bind the configured address and serve until Ctrl-C.
pub async fn run(
    config: Config,
    options: RelayOptions,
    extra_routes: Option<Router>,
) -> Result<(), RelayError> {
    let broker = connect_broker(&config).await?;
    let state = AppState::new(broker, options);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!("listening on {addr}");

    serve(listener, state, extra_routes, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
