//! Configuration module for the relay server
//!
//! This module handles server configuration from various sources: YAML files and
//! environment variables. The configuration is split into logical submodules.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `credentials`: Credential seeds for the in-memory store
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use voxgate::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file, falling back to the environment for unset values
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod credentials;
mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use credentials::CredentialSeed;

use crate::auth::OriginPolicy;
use crate::core::quota::QuotaPolicy;
use crate::core::store::TrialLimits;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 1323;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_DASHBOARD_MAX_SESSION_SECONDS: u64 = 300;
pub const DEFAULT_APP_ENV: &str = "production";
pub const DEFAULT_APP_BASE_URL: &str = "https://hyperwhisper.dev";

/// Server configuration
///
/// Contains all configuration needed to run the relay:
/// - Server settings (host, port)
/// - Transcription provider endpoint and key
/// - Dashboard token secret and allowed browser origins
/// - Session ceilings and trial limits
/// - Seeded credentials for the in-memory store
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Provider settings; relaying is disabled without a key
    pub deepgram_api_key: Option<String>,
    pub deepgram_url: String,
    pub handshake_timeout_seconds: u64,

    // Authentication
    pub jwt_secret: Option<String>,
    pub allowed_origins: Vec<String>,

    // Session ceilings
    pub dashboard_max_session_seconds: u64,
    pub metered_max_session_seconds: Option<u64>,

    // Application
    pub app_env: String,
    pub app_base_url: String,

    pub trial_limits: TrialLimits,
    pub credentials: Vec<CredentialSeed>,
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable fallback
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is not loaded here; the YAML file is the source of truth and
        // only real environment variables fill its gaps.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Development mode disables the browser origin check.
    pub fn is_dev(&self) -> bool {
        matches!(
            self.app_env.trim().to_lowercase().as_str(),
            "dev" | "development"
        )
    }

    /// Where trial users are sent when their key runs out.
    pub fn upgrade_url(&self) -> String {
        format!("{}/signup", self.app_base_url.trim_end_matches('/'))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy::new(
            self.metered_max_session_seconds.map(Duration::from_secs),
            Duration::from_secs(self.dashboard_max_session_seconds),
        )
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        if self.is_dev() {
            OriginPolicy::allow_any()
        } else {
            OriginPolicy::restricted(self.allowed_origins.iter().cloned())
        }
    }
}
