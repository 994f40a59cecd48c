use std::env;

use super::utils::{parse_list, parse_number};
use super::yaml::YamlConfig;
use super::{
    DEFAULT_APP_BASE_URL, DEFAULT_APP_ENV, DEFAULT_DASHBOARD_MAX_SESSION_SECONDS,
    DEFAULT_HANDSHAKE_TIMEOUT_SECONDS, DEFAULT_HOST, DEFAULT_PORT, ServerConfig,
};
use crate::auth::origin::DEFAULT_ALLOWED_ORIGINS;
use crate::core::store::TrialLimits;
use crate::core::upstream::connector::DEFAULT_DEEPGRAM_URL;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// The credential seed list is only read from YAML.
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    // Numeric values: YAML > ENV (must parse) > Default
    macro_rules! get_number {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => match env::var($env_var) {
                    Ok(raw) => parse_number($env_var, &raw)?,
                    Err(_) => $default,
                },
            }
        };
    }

    // Server configuration
    let host = get_value!(
        "HOST",
        yaml.server.as_ref().and_then(|s| s.host.clone()),
        DEFAULT_HOST
    );
    let port: u16 = get_number!(
        "PORT",
        yaml.server.as_ref().and_then(|s| s.port),
        DEFAULT_PORT
    );

    // Transcription provider
    let deepgram_api_key = get_optional!(
        "DEEPGRAM_API_KEY",
        yaml.deepgram.as_ref().and_then(|d| d.api_key.clone())
    )
    .filter(|key| !key.trim().is_empty());
    let deepgram_url = get_value!(
        "DEEPGRAM_URL",
        yaml.deepgram.as_ref().and_then(|d| d.url.clone()),
        DEFAULT_DEEPGRAM_URL
    );
    let handshake_timeout_seconds: u64 = get_number!(
        "UPSTREAM_HANDSHAKE_TIMEOUT_SECONDS",
        yaml.deepgram
            .as_ref()
            .and_then(|d| d.handshake_timeout_seconds),
        DEFAULT_HANDSHAKE_TIMEOUT_SECONDS
    );

    // Authentication
    let jwt_secret = get_optional!(
        "JWT_SECRET",
        yaml.auth.as_ref().and_then(|a| a.jwt_secret.clone())
    )
    .filter(|secret| !secret.is_empty());

    let allowed_origins = yaml
        .auth
        .as_ref()
        .and_then(|a| a.allowed_origins.clone())
        .or_else(|| env::var("ALLOWED_ORIGINS").ok().map(|v| parse_list(&v)))
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(|| {
            DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

    // Application
    let app_env = get_value!(
        "APP_ENV",
        yaml.app.as_ref().and_then(|a| a.env.clone()),
        DEFAULT_APP_ENV
    );
    let app_base_url = get_value!(
        "APP_BASE_URL",
        yaml.app.as_ref().and_then(|a| a.base_url.clone()),
        DEFAULT_APP_BASE_URL
    );

    // Session ceilings
    let dashboard_max_session_seconds: u64 = get_number!(
        "DASHBOARD_MAX_SESSION_SECONDS",
        yaml.sessions
            .as_ref()
            .and_then(|s| s.dashboard_max_seconds),
        DEFAULT_DASHBOARD_MAX_SESSION_SECONDS
    );
    let metered_max_session_seconds: Option<u64> =
        match yaml.sessions.as_ref().and_then(|s| s.metered_max_seconds) {
            Some(value) => Some(value),
            None => match env::var("METERED_MAX_SESSION_SECONDS") {
                Ok(raw) if !raw.trim().is_empty() => {
                    Some(parse_number("METERED_MAX_SESSION_SECONDS", &raw)?)
                }
                _ => None,
            },
        };

    // Trial limits
    let defaults = TrialLimits::default();
    let trial = yaml.trial.clone().unwrap_or_default();
    let trial_limits = TrialLimits {
        max_duration_seconds: get_number!(
            "TRIAL_MAX_DURATION_SECONDS",
            trial.max_duration_seconds,
            defaults.max_duration_seconds
        ),
        max_sessions: get_number!(
            "TRIAL_MAX_SESSIONS",
            trial.max_sessions,
            defaults.max_sessions
        ),
        max_session_duration_seconds: get_number!(
            "TRIAL_MAX_SESSION_DURATION_SECONDS",
            trial.max_session_duration_seconds,
            defaults.max_session_duration_seconds
        ),
        expiry_days: get_number!(
            "TRIAL_EXPIRY_DAYS",
            trial.expiry_days,
            defaults.expiry_days
        ),
    };

    Ok(ServerConfig {
        host,
        port,
        deepgram_api_key,
        deepgram_url,
        handshake_timeout_seconds,
        jwt_secret,
        dashboard_max_session_seconds,
        metered_max_session_seconds,
        app_env,
        app_base_url,
        allowed_origins,
        trial_limits,
        credentials: yaml.credentials,
    })
}
