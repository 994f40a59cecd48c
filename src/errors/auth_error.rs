use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::core::store::{CredentialKind, StoreError};

/// Error codes for structured error responses
pub mod error_codes {
    pub const MISSING_API_KEY: &str = "missing_api_key";
    pub const MISSING_TOKEN: &str = "missing_token";
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const CREDENTIAL_REVOKED: &str = "credential_revoked";
    pub const CREDENTIAL_EXPIRED: &str = "credential_expired";
    pub const QUOTA_EXCEEDED: &str = "quota_exceeded";
    pub const ORIGIN_NOT_ALLOWED: &str = "origin_not_allowed";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const CONFIG_ERROR: &str = "config_error";
}

/// Reasons a session request is refused before the socket is upgraded.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No API key in the `api_key` query parameter or `X-API-Key` header
    #[error("API key required")]
    MissingCredential,

    /// No dashboard access token in the Authorization header or cookie
    #[error("authentication required")]
    MissingToken,

    /// Key has an unknown prefix or matches no stored credential
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{kind} key revoked")]
    Revoked {
        kind: CredentialKind,
        upgrade_url: Option<String>,
    },

    #[error("{kind} key expired")]
    Expired {
        kind: CredentialKind,
        upgrade_url: Option<String>,
    },

    #[error("trial quota exceeded")]
    QuotaExceeded { upgrade_url: Option<String> },

    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// Credential or usage storage could not be read
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error (missing provider key, missing JWT secret)
    #[error("Auth configuration error: {0}")]
    ConfigError(String),

    /// Dashboard token failed verification
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

impl AuthError {
    /// Get the error code for structured error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => error_codes::MISSING_API_KEY,
            AuthError::MissingToken => error_codes::MISSING_TOKEN,
            AuthError::Unauthenticated(_) => error_codes::UNAUTHENTICATED,
            AuthError::Revoked { .. } => error_codes::CREDENTIAL_REVOKED,
            AuthError::Expired { .. } => error_codes::CREDENTIAL_EXPIRED,
            AuthError::QuotaExceeded { .. } => error_codes::QUOTA_EXCEEDED,
            AuthError::OriginNotAllowed(_) => error_codes::ORIGIN_NOT_ALLOWED,
            AuthError::StoreUnavailable(_) => error_codes::STORE_UNAVAILABLE,
            AuthError::ConfigError(_) => error_codes::CONFIG_ERROR,
            AuthError::InvalidToken(_) => error_codes::INVALID_TOKEN,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential
            | AuthError::MissingToken
            | AuthError::Unauthenticated(_)
            | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::Revoked { .. }
            | AuthError::Expired { .. }
            | AuthError::QuotaExceeded { .. }
            | AuthError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Where a trial user can sign up for a full account, if relevant.
    pub fn upgrade_url(&self) -> Option<&str> {
        match self {
            AuthError::Revoked { upgrade_url, .. }
            | AuthError::Expired { upgrade_url, .. }
            | AuthError::QuotaExceeded { upgrade_url } => upgrade_url.as_deref(),
            _ => None,
        }
    }

    /// Log the error at the appropriate level
    pub fn log(&self) {
        match self {
            // Debug level for requests that simply carried no credential
            AuthError::MissingCredential | AuthError::MissingToken => {
                tracing::debug!("{}", self);
            }
            // Warn level for rejected credentials
            AuthError::Unauthenticated(_)
            | AuthError::Revoked { .. }
            | AuthError::Expired { .. }
            | AuthError::QuotaExceeded { .. }
            | AuthError::OriginNotAllowed(_) => {
                tracing::warn!("Rejected session request: {}", self);
            }
            AuthError::InvalidToken(err) => {
                tracing::warn!("Invalid dashboard token: {}", err);
            }
            // Error level for system issues
            AuthError::StoreUnavailable(msg) => {
                tracing::error!("Credential store unavailable: {}", msg);
            }
            AuthError::ConfigError(msg) => {
                tracing::error!("Auth configuration error: {}", msg);
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let mut body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
        });
        if let Some(url) = self.upgrade_url() {
            body["upgrade_url"] = json!(url);
        }

        (status, Json(body)).into_response()
    }
}

// Result type alias for convenience
pub type AuthResult<T> = Result<T, AuthError>;
