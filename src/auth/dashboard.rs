//! Verification of dashboard access tokens.
//!
//! Tokens are issued elsewhere; this side only checks the HS256 signature,
//! expiry and token type.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::DashboardUser;
use crate::errors::auth_error::{AuthError, AuthResult};

/// Token type accepted for streaming. Refresh tokens are rejected.
pub const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardClaims {
    pub user_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    pub token_type: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

#[derive(Clone)]
pub struct DashboardTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for DashboardTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardTokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl DashboardTokenVerifier {
    pub fn new(secret: &str) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::ConfigError("JWT secret is empty".into()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> AuthResult<DashboardUser> {
        let data = decode::<DashboardClaims>(token, &self.key, &self.validation)?;
        let claims = data.claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::Unauthenticated("invalid token type".into()));
        }

        Ok(DashboardUser {
            user_id: claims.user_id,
            username: claims.username,
            email: claims.email.filter(|e| !e.is_empty()),
            user_type: claims.user_type,
        })
    }
}
