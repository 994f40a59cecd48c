use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, trial};
use crate::state::AppState;
use std::sync::Arc;

pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/health", get(api::health_check))
        // Trial keys authenticate themselves; no middleware
        .route("/api/v1/trial/status", get(trial::trial_status_handler))
        .route("/api/v1/trial/usage", get(trial::trial_usage_handler))
        .layer(TraceLayer::new_for_http())
}
