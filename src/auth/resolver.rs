//! Turns an opaque API key into an [`AuthorizationContext`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::AuthorizationContext;
use super::credential::{display_prefix, hash_credential};
use crate::core::quota::{QuotaPolicy, TrialDecision};
use crate::core::store::{CredentialKind, CredentialStore, StoredCredential, Subject, UsageStore};
use crate::errors::auth_error::{AuthError, AuthResult};

/// Trial key status as reported to the client app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialStatus {
    pub active: bool,
    pub remaining_duration_seconds: f64,
    pub remaining_sessions: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub revoked: bool,
    pub quota_exceeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_url: Option<String>,
}

/// Cumulative usage of a trial key against its limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialUsage {
    pub total_duration_seconds: f64,
    pub total_sessions: u64,
    pub remaining_duration_seconds: f64,
    pub remaining_sessions: u64,
    pub max_duration_seconds: u64,
    pub max_sessions: u64,
    pub max_session_duration_seconds: u64,
    pub quota_exceeded: bool,
}

/// Authenticates metered and trial API keys.
///
/// Keys are looked up by digest only. Trial keys additionally have their
/// quota evaluated against a fresh usage aggregate on every call.
pub struct CredentialResolver {
    credentials: Arc<dyn CredentialStore>,
    usage: Arc<dyn UsageStore>,
    quota: QuotaPolicy,
    upgrade_url: String,
}

impl CredentialResolver {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        usage: Arc<dyn UsageStore>,
        quota: QuotaPolicy,
        upgrade_url: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            usage,
            quota,
            upgrade_url: upgrade_url.into(),
        }
    }

    pub fn quota(&self) -> &QuotaPolicy {
        &self.quota
    }

    pub fn upgrade_url(&self) -> &str {
        &self.upgrade_url
    }

    /// Authorize a new session for `secret`.
    ///
    /// Rejections come back in a fixed order: unknown key, revoked, expired,
    /// quota exhausted. On success the credential's last-used time is
    /// refreshed in the background.
    pub async fn resolve(&self, secret: &str) -> AuthResult<AuthorizationContext> {
        let (kind, credential) = self.lookup(secret).await?;
        let prefix = display_prefix(secret, kind);
        let hint = self.hint_for(kind);

        if credential.is_revoked() {
            return Err(AuthError::Revoked {
                kind,
                upgrade_url: hint,
            });
        }
        if credential.is_expired(Utc::now()) {
            return Err(AuthError::Expired {
                kind,
                upgrade_url: hint,
            });
        }

        let context = match (&kind, &credential.subject) {
            (CredentialKind::Metered, Subject::User(user_id)) => AuthorizationContext::metered(
                credential.id,
                *user_id,
                prefix,
                self.quota.metered(),
            ),
            (CredentialKind::Trial, Subject::Device(fingerprint)) => {
                let (snapshot, deadline) = match self.evaluate_trial(&credential).await? {
                    TrialDecision::Admit { snapshot, deadline } => (snapshot, deadline),
                    TrialDecision::Exhausted(snapshot) => {
                        info!(
                            key = %prefix,
                            remaining_seconds = snapshot.remaining_duration_seconds,
                            remaining_sessions = snapshot.remaining_sessions,
                            "Trial quota exhausted"
                        );
                        return Err(AuthError::QuotaExceeded { upgrade_url: hint });
                    }
                };
                debug!(
                    key = %prefix,
                    deadline_secs = deadline.as_secs_f64(),
                    remaining_seconds = snapshot.remaining_duration_seconds,
                    "Trial session admitted"
                );
                AuthorizationContext::trial(
                    credential.id,
                    fingerprint.clone(),
                    prefix,
                    credential.expires_at,
                    snapshot,
                    deadline,
                )
            }
            (kind, subject) => {
                warn!(key = %prefix, %kind, %subject, "Credential owner does not match its kind");
                return Err(AuthError::Unauthenticated(format!("invalid {kind} key")));
            }
        };

        self.touch(credential.id);
        Ok(context)
    }

    /// Report a trial key's state without admitting a session.
    pub async fn trial_status(&self, secret: &str) -> AuthResult<TrialStatus> {
        if CredentialKind::detect(secret) != Some(CredentialKind::Trial) {
            return Err(AuthError::Unauthenticated("invalid trial key".into()));
        }
        let (_, credential) = self.lookup(secret).await?;

        let snapshot = match self.evaluate_trial(&credential).await? {
            TrialDecision::Admit { snapshot, .. } | TrialDecision::Exhausted(snapshot) => snapshot,
        };
        let expired = credential.is_expired(Utc::now());
        let revoked = credential.is_revoked();
        let quota_exceeded = snapshot.is_exhausted();

        Ok(TrialStatus {
            active: !expired && !revoked && !quota_exceeded,
            remaining_duration_seconds: snapshot.remaining_duration_seconds,
            remaining_sessions: snapshot.remaining_sessions,
            expires_at: credential.expires_at,
            expired,
            revoked,
            quota_exceeded,
            upgrade_url: (expired || quota_exceeded).then(|| self.upgrade_url.clone()),
        })
    }

    /// Report a trial key's billable usage. Expired and revoked keys still
    /// get a report.
    pub async fn trial_usage(&self, secret: &str) -> AuthResult<TrialUsage> {
        if CredentialKind::detect(secret) != Some(CredentialKind::Trial) {
            return Err(AuthError::Unauthenticated("invalid trial key".into()));
        }
        let (_, credential) = self.lookup(secret).await?;

        let limits = self.credentials.trial_limits().await?;
        let aggregate = self.usage.aggregate_usage(&credential.owner()).await?;
        let snapshot = QuotaPolicy::remaining(&limits, &aggregate);

        Ok(TrialUsage {
            total_duration_seconds: snapshot.used_duration_seconds,
            total_sessions: snapshot.used_sessions,
            remaining_duration_seconds: snapshot.remaining_duration_seconds,
            remaining_sessions: snapshot.remaining_sessions,
            max_duration_seconds: limits.max_duration_seconds,
            max_sessions: limits.max_sessions,
            max_session_duration_seconds: limits.max_session_duration_seconds,
            quota_exceeded: snapshot.is_exhausted(),
        })
    }

    async fn lookup(&self, secret: &str) -> AuthResult<(CredentialKind, StoredCredential)> {
        let kind = CredentialKind::detect(secret)
            .ok_or_else(|| AuthError::Unauthenticated("invalid API key".into()))?;
        let unknown = || AuthError::Unauthenticated(format!("invalid {kind} key"));

        let digest = hash_credential(secret);
        let credential = self
            .credentials
            .find_by_digest(&digest)
            .await?
            .ok_or_else(unknown)?;

        if credential.kind != kind {
            warn!(
                key = %display_prefix(secret, kind),
                stored = %credential.kind,
                "Credential kind does not match key prefix"
            );
            return Err(unknown());
        }
        Ok((kind, credential))
    }

    async fn evaluate_trial(&self, credential: &StoredCredential) -> AuthResult<TrialDecision> {
        let limits = self.credentials.trial_limits().await?;
        let aggregate = self.usage.aggregate_usage(&credential.owner()).await?;
        Ok(QuotaPolicy::trial(&limits, &aggregate))
    }

    fn hint_for(&self, kind: CredentialKind) -> Option<String> {
        match kind {
            CredentialKind::Trial => Some(self.upgrade_url.clone()),
            CredentialKind::Metered => None,
        }
    }

    fn touch(&self, id: Uuid) {
        let credentials = self.credentials.clone();
        tokio::spawn(async move {
            if let Err(e) = credentials.touch_last_used(id).await {
                warn!(credential_id = %id, "Failed to update last used time: {}", e);
            }
        });
    }
}
