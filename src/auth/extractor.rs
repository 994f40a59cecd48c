use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, Uri, header, request::Parts};

use crate::errors::auth_error::AuthError;

pub const API_KEY_QUERY_PARAM: &str = "api_key";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Extract an API key from a streaming or status request.
///
/// Priority:
/// 1. `api_key` query parameter
/// 2. `X-API-Key` header
pub fn extract_api_key(headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
    if let Some(key) = query_param(uri, API_KEY_QUERY_PARAM) {
        return Ok(key);
    }

    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or(AuthError::MissingCredential)
}

/// Extract a dashboard access token.
///
/// Priority:
/// 1. `Authorization: Bearer <token>` header
/// 2. `access_token` cookie
pub fn extract_dashboard_token(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Ok(token.to_owned());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == ACCESS_TOKEN_COOKIE && !value.is_empty()).then(|| value.to_owned())
        })
        .ok_or(AuthError::MissingToken)
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes()).find_map(|(key, value)| {
            let value = value.trim();
            (key == name && !value.is_empty()).then(|| value.to_owned())
        })
    })
}

/// Network origin of the client as best as the proxy chain reports it.
///
/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer
/// address when the server was started with connect info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOrigin(pub Option<String>);

impl ClientOrigin {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let origin = forwarded
            .or_else(real_ip)
            .map(str::to_owned)
            .or_else(|| peer.map(|addr| addr.ip().to_string()));
        Self(origin)
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}
