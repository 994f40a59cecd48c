use std::sync::Arc;

use chrono::Utc;

use crate::auth::{CredentialResolver, DashboardTokenVerifier, OriginPolicy};
use crate::config::ServerConfig;
use crate::core::factory::SessionFactory;
use crate::core::store::MemoryStore;
use crate::core::upstream::DeepgramConnector;
use crate::errors::app_error::{AppError, AppResult};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Credential and usage storage, seeded from configuration
    pub store: Arc<MemoryStore>,
    pub resolver: Arc<CredentialResolver>,
    /// Present only when a provider key is configured
    pub sessions: Option<Arc<SessionFactory>>,
    /// Present only when a dashboard token secret is configured
    pub dashboard_tokens: Option<DashboardTokenVerifier>,
    pub origins: OriginPolicy,
}

impl AppState {
    pub fn new(config: ServerConfig) -> AppResult<Arc<Self>> {
        let store = Arc::new(MemoryStore::with_trial_limits(config.trial_limits));
        let now = Utc::now();
        for seed in &config.credentials {
            let credential = seed.to_stored(now, &config.trial_limits).ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "credential seed for owner '{}' does not fit a {} key",
                    seed.owner, seed.kind
                ))
            })?;
            store.insert_credential(credential);
        }
        if !config.credentials.is_empty() {
            tracing::info!("Seeded {} credentials", config.credentials.len());
        }

        let resolver = Arc::new(CredentialResolver::new(
            store.clone(),
            store.clone(),
            config.quota_policy(),
            config.upgrade_url(),
        ));

        let sessions = match &config.deepgram_api_key {
            Some(api_key) => {
                let connector = DeepgramConnector::new(
                    &config.deepgram_url,
                    api_key.clone(),
                    config.handshake_timeout(),
                )
                .map_err(|e| AppError::InternalServerError(e.to_string()))?;
                Some(Arc::new(SessionFactory::new(
                    Arc::new(connector),
                    store.clone(),
                )))
            }
            None => {
                tracing::warn!("DEEPGRAM_API_KEY is not set; transcription sessions are disabled");
                None
            }
        };

        let dashboard_tokens = match &config.jwt_secret {
            Some(secret) => Some(
                DashboardTokenVerifier::new(secret)
                    .map_err(|e| AppError::InternalServerError(e.to_string()))?,
            ),
            None => None,
        };

        let origins = config.origin_policy();

        Ok(Arc::new(Self {
            config,
            store,
            resolver,
            sessions,
            dashboard_tokens,
            origins,
        }))
    }

    /// Session factory, or a 503 when no provider key is configured.
    pub fn session_factory(&self) -> AppResult<Arc<SessionFactory>> {
        self.sessions.clone().ok_or_else(|| {
            AppError::ServiceUnavailable("transcription provider is not configured".to_string())
        })
    }
}
