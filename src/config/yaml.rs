use serde::Deserialize;
use std::path::PathBuf;

use super::credentials::CredentialSeed;

/// Complete YAML configuration structure
///
/// All fields are optional so a file can carry only the values it wants to
/// pin. Anything missing falls back to the environment, then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 1323
///
/// deepgram:
///   api_key: "your-deepgram-key"
///   url: "wss://api.deepgram.com/v1/listen"
///   handshake_timeout_seconds: 10
///
/// auth:
///   jwt_secret: "dashboard-signing-secret"
///   allowed_origins:
///     - "https://hyperwhisper.dev"
///
/// app:
///   env: "production"
///   base_url: "https://hyperwhisper.dev"
///
/// sessions:
///   dashboard_max_seconds: 300
///   metered_max_seconds: 7200
///
/// trial:
///   max_duration_seconds: 1800
///   max_sessions: 20
///   max_session_duration_seconds: 300
///   expiry_days: 90
///
/// credentials:
///   - kind: metered
///     key_hash: "<sha256 hex>"
///     owner: "6f1c2b1e-8a55-4a4f-9a57-0d7c52f4f1a2"
///   - kind: trial
///     key_hash: "<sha256 hex>"
///     owner: "device-fingerprint"
///     expires_at: "2030-01-01T00:00:00Z"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub deepgram: Option<DeepgramYaml>,
    pub auth: Option<AuthYaml>,
    pub app: Option<AppYaml>,
    pub sessions: Option<SessionsYaml>,
    pub trial: Option<TrialYaml>,
    pub credentials: Vec<CredentialSeed>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Transcription provider settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeepgramYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub handshake_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub jwt_secret: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppYaml {
    pub env: Option<String>,
    pub base_url: Option<String>,
}

/// Session ceilings for credential classes without a quota
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionsYaml {
    pub dashboard_max_seconds: Option<u64>,
    pub metered_max_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TrialYaml {
    pub max_duration_seconds: Option<u64>,
    pub max_sessions: Option<u64>,
    pub max_session_duration_seconds: Option<u64>,
    pub expiry_days: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
