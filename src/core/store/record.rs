//! Stored credential and usage record types.
//!
//! These are the shapes exchanged with the persistence collaborator. The relay
//! never deletes anything here; it only creates usage records and moves each
//! one to a terminal status exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::upstream::TranscriptionParams;

/// Kind of API credential, derived from the key's structural prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Long-lived key tied to a billed account.
    Metered,
    /// Short-lived key tied to a device fingerprint, subject to quota.
    Trial,
}

impl CredentialKind {
    pub const METERED_PREFIX: &'static str = "hw_live_";
    pub const TRIAL_PREFIX: &'static str = "hw_trial_";

    /// Classify a raw key by its prefix.
    pub fn detect(secret: &str) -> Option<Self> {
        if secret.starts_with(Self::TRIAL_PREFIX) {
            Some(Self::Trial)
        } else if secret.starts_with(Self::METERED_PREFIX) {
            Some(Self::Metered)
        } else {
            None
        }
    }

    /// Number of leading characters that are safe to show in logs.
    pub fn display_prefix_len(self) -> usize {
        match self {
            Self::Metered => 12,
            Self::Trial => 16,
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metered => f.write_str("metered"),
            Self::Trial => f.write_str("trial"),
        }
    }
}

/// Who a credential (and therefore a usage record) belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Subject {
    /// A registered account.
    User(Uuid),
    /// An anonymous device, identified by its fingerprint.
    Device(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Device(fingerprint) => {
                let shown: String = fingerprint.chars().take(8).collect();
                write!(f, "device:{shown}")
            }
        }
    }
}

/// Reference used to attribute usage records and to aggregate them.
///
/// Aggregation is keyed on the credential, so regenerating a trial key for the
/// same device starts from whatever the store attributes to the new credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub credential_id: Uuid,
    pub subject: Subject,
}

impl OwnerRef {
    pub fn new(credential_id: Uuid, subject: Subject) -> Self {
        Self {
            credential_id,
            subject,
        }
    }
}

/// A credential as persisted: only the digest of the secret is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub id: Uuid,
    pub kind: CredentialKind,
    pub key_hash: String,
    pub key_prefix: String,
    pub subject: Subject,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(self.id, self.subject.clone())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// Administrative trial quota limits. Read-only from the relay's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialLimits {
    pub max_duration_seconds: u64,
    pub max_sessions: u64,
    pub max_session_duration_seconds: u64,
    pub expiry_days: u32,
}

impl Default for TrialLimits {
    fn default() -> Self {
        Self {
            max_duration_seconds: 1800,
            max_sessions: 20,
            max_session_duration_seconds: 300,
            expiry_days: 90,
        }
    }
}

/// Lifecycle status of a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Active,
    Completed,
    Error,
    Timeout,
}

impl UsageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Whether the record counts against a trial quota.
    pub fn is_billable(self) -> bool {
        matches!(self, Self::Completed | Self::Timeout)
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// One relayed (or attempted) transcription session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub status: UsageStatus,
    pub error_message: Option<String>,
    pub bytes_sent: u64,
    pub params: TranscriptionParams,
    pub client_origin: Option<String>,
}

/// The single terminal mutation applied to a usage record.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub status: UsageStatus,
    pub duration_seconds: Option<f64>,
    pub bytes_sent: u64,
    pub error_message: Option<String>,
}

impl Finalization {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: UsageStatus::Error,
            duration_seconds: None,
            bytes_sent: 0,
            error_message: Some(message.into()),
        }
    }
}

/// Sums over prior billable usage records of one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub sessions: u64,
    pub total_duration_seconds: f64,
}
