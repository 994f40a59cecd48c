use axum::http::{HeaderMap, header};

use crate::errors::auth_error::AuthError;

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] =
    &["https://hyperwhisper.dev", "https://www.hyperwhisper.dev"];

/// Browser origin check applied before a WebSocket upgrade.
///
/// Requests without an `Origin` header come from native clients and pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allow_any: bool,
    allowed: Vec<String>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::restricted(DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()))
    }
}

impl OriginPolicy {
    pub fn allow_any() -> Self {
        Self {
            allow_any: true,
            allowed: Vec::new(),
        }
    }

    pub fn restricted<I: IntoIterator<Item = String>>(origins: I) -> Self {
        Self {
            allow_any: false,
            allowed: origins
                .into_iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        if self.allow_any {
            return Ok(());
        }
        let Some(origin) = headers.get(header::ORIGIN) else {
            return Ok(());
        };
        let origin = origin
            .to_str()
            .map_err(|_| AuthError::OriginNotAllowed("<non-ascii>".into()))?;
        if self.allowed.iter().any(|allowed| allowed == origin) {
            Ok(())
        } else {
            Err(AuthError::OriginNotAllowed(origin.to_string()))
        }
    }
}
