use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::listen;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
///
/// Authentication happens inside each handler, before the upgrade, because
/// the two endpoints accept different credentials: an API key (metered or
/// trial, told apart by prefix) or a dashboard access token.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/deepgram/listen", get(listen::listen_handler))
        .route(
            "/api/v1/deepgram/dashboard/listen",
            get(listen::dashboard_listen_handler),
        )
        .layer(TraceLayer::new_for_http())
}
