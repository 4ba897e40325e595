mod health;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router: the relay route, health and version, plus
/// any extra routes the embedding application mounts alongside them.
pub fn router(state: AppState, extra_routes: Option<Router>) -> Router {
    let mut app = Router::new()
        .route("/handler/{channel}", get(crate::relay::ws_upgrade))
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .with_state(state);

    if let Some(extra) = extra_routes {
        app = app.merge(extra);
    }

    app.layer(TraceLayer::new_for_http())
}
