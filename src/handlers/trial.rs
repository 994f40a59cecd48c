use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    response::Json,
};

use crate::auth::{TrialStatus, TrialUsage, extract_api_key};
use crate::errors::auth_error::AuthResult;
use crate::state::AppState;

/// Remaining allowance of a trial key, for the client app to display.
pub async fn trial_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> AuthResult<Json<TrialStatus>> {
    let secret = extract_api_key(&headers, &uri)?;
    let status = state.resolver.trial_status(&secret).await?;
    Ok(Json(status))
}

/// Billable usage of a trial key next to its limits.
pub async fn trial_usage_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> AuthResult<Json<TrialUsage>> {
    let secret = extract_api_key(&headers, &uri)?;
    let usage = state.resolver.trial_usage(&secret).await?;
    Ok(Json(usage))
}
