use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::quota::QuotaSnapshot;
use crate::core::store::{CredentialKind, OwnerRef, Subject};

/// Dashboard user taken from a verified access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardUser {
    pub user_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

/// Who a session is being relayed for.
#[derive(Clone, Debug, PartialEq)]
pub enum Identity {
    /// API key of a billed account.
    Metered {
        credential_id: Uuid,
        user_id: Uuid,
        key_prefix: String,
    },
    /// Quota-limited key bound to a device fingerprint.
    Trial {
        credential_id: Uuid,
        device_fingerprint: String,
        key_prefix: String,
        expires_at: Option<DateTime<Utc>>,
    },
    /// Interactive preview from the web dashboard. Never persisted.
    Dashboard(DashboardUser),
}

impl Identity {
    pub fn credential_kind(&self) -> Option<CredentialKind> {
        match self {
            Self::Metered { .. } => Some(CredentialKind::Metered),
            Self::Trial { .. } => Some(CredentialKind::Trial),
            Self::Dashboard(_) => None,
        }
    }

    /// Owner reference for usage records. Dashboard sessions have none.
    pub fn owner(&self) -> Option<OwnerRef> {
        match self {
            Self::Metered {
                credential_id,
                user_id,
                ..
            } => Some(OwnerRef::new(*credential_id, Subject::User(*user_id))),
            Self::Trial {
                credential_id,
                device_fingerprint,
                ..
            } => Some(OwnerRef::new(
                *credential_id,
                Subject::Device(device_fingerprint.clone()),
            )),
            Self::Dashboard(_) => None,
        }
    }

    /// Short, non-secret label for logs.
    pub fn log_label(&self) -> String {
        match self {
            Self::Metered { key_prefix, .. } | Self::Trial { key_prefix, .. } => {
                format!("{key_prefix}...")
            }
            Self::Dashboard(user) => format!("dashboard:{}", user.user_id),
        }
    }
}

/// Result of authorizing one session request.
///
/// Built fresh per request and owned by that session; the quota snapshot and
/// deadline reflect usage at the moment of authorization.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizationContext {
    pub identity: Identity,
    /// Present for trial credentials only.
    pub quota: Option<QuotaSnapshot>,
    /// `None` means the session runs until either side finishes.
    pub deadline: Option<Duration>,
}

impl AuthorizationContext {
    pub fn metered(
        credential_id: Uuid,
        user_id: Uuid,
        key_prefix: impl Into<String>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            identity: Identity::Metered {
                credential_id,
                user_id,
                key_prefix: key_prefix.into(),
            },
            quota: None,
            deadline,
        }
    }

    pub fn trial(
        credential_id: Uuid,
        device_fingerprint: impl Into<String>,
        key_prefix: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        quota: QuotaSnapshot,
        deadline: Duration,
    ) -> Self {
        Self {
            identity: Identity::Trial {
                credential_id,
                device_fingerprint: device_fingerprint.into(),
                key_prefix: key_prefix.into(),
                expires_at,
            },
            quota: Some(quota),
            deadline: Some(deadline),
        }
    }

    pub fn dashboard(user: DashboardUser, ceiling: Duration) -> Self {
        Self {
            identity: Identity::Dashboard(user),
            quota: None,
            deadline: Some(ceiling),
        }
    }

    pub fn owner(&self) -> Option<OwnerRef> {
        self.identity.owner()
    }
}
