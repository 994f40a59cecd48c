//! Streaming transcription endpoints.
//!
//! Every check happens before the upgrade so that a rejected client gets a
//! plain HTTP error: origin first, then the credential, then whether this
//! server can relay at all.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::auth::{
    AuthorizationContext, ClientOrigin, extract_api_key, extract_dashboard_token,
};
use crate::core::factory::{SessionFactory, SessionRequest};
use crate::core::relay::Connection;
use crate::core::upstream::TranscriptionParams;
use crate::errors::auth_error::AuthError;
use crate::state::AppState;

/// Metered or trial session, dispatched by the key's prefix.
pub async fn listen_handler(
    State(state): State<Arc<AppState>>,
    origin: ClientOrigin,
    headers: HeaderMap,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = state.origins.check(&headers) {
        return e.into_response();
    }

    let secret = match extract_api_key(&headers, &uri) {
        Ok(secret) => secret,
        Err(e) => return e.into_response(),
    };
    let context = match state.resolver.resolve(&secret).await {
        Ok(context) => context,
        Err(e) => return e.into_response(),
    };

    let factory = match state.session_factory() {
        Ok(factory) => factory,
        Err(e) => return e.into_response(),
    };

    let request = SessionRequest {
        context,
        params: TranscriptionParams::from_query(uri.query()),
        client_origin: origin.0,
    };
    upgrade(factory, request, ws).await
}

/// Interactive dashboard session, authenticated by an access token.
pub async fn dashboard_listen_handler(
    State(state): State<Arc<AppState>>,
    origin: ClientOrigin,
    headers: HeaderMap,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = state.origins.check(&headers) {
        return e.into_response();
    }

    let Some(verifier) = state.dashboard_tokens.as_ref() else {
        return AuthError::ConfigError("dashboard token secret is not configured".into())
            .into_response();
    };
    let user = match extract_dashboard_token(&headers).and_then(|token| verifier.verify(&token)) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    let factory = match state.session_factory() {
        Ok(factory) => factory,
        Err(e) => return e.into_response(),
    };

    let request = SessionRequest {
        context: AuthorizationContext::dashboard(user, state.resolver.quota().dashboard()),
        params: TranscriptionParams::from_query(uri.query()),
        client_origin: origin.0,
    };
    upgrade(factory, request, ws).await
}

async fn upgrade(
    factory: Arc<SessionFactory>,
    request: SessionRequest,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("WebSocket upgrade rejected: {}", rejection);
            factory.record_upgrade_failure(&request).await;
            return rejection.into_response();
        }
    };

    let on_failure = (factory.clone(), request.clone());
    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!("WebSocket upgrade failed: {}", e);
        let (factory, request) = on_failure;
        tokio::spawn(async move {
            factory.record_upgrade_failure(&request).await;
        });
    })
    .on_upgrade(move |socket| async move {
        let outcome = factory
            .run(Connection::from_client_socket(socket), request)
            .await;
        info!(
            session_id = %outcome.session_id,
            kind = %outcome.kind,
            status = %outcome.status,
            termination = ?outcome.termination,
            "WebSocket session closed"
        );
    })
}
