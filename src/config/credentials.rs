//! Credential seeds
//!
//! A deployment without an external credential database lists its keys in the
//! YAML file. Only the SHA-256 digest of each key is configured; the plaintext
//! never appears in configuration.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::core::store::{CredentialKind, StoredCredential, Subject, TrialLimits};

/// One credential entry from the `credentials:` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialSeed {
    pub kind: CredentialKind,
    /// Lowercase hex SHA-256 digest of the full key
    pub key_hash: String,
    /// User id (metered) or device fingerprint (trial)
    pub owner: String,
    /// Non-secret prefix shown in logs; derived from the kind when absent
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl CredentialSeed {
    /// Owner in its typed form, or `None` when it does not fit the kind.
    pub fn subject(&self) -> Option<Subject> {
        let owner = self.owner.trim();
        match self.kind {
            CredentialKind::Metered => Uuid::parse_str(owner).ok().map(Subject::User),
            CredentialKind::Trial if !owner.is_empty() => Some(Subject::Device(owner.to_string())),
            CredentialKind::Trial => None,
        }
    }

    /// Convert into a stored credential with a fresh id.
    ///
    /// Callers validate seeds first; an owner that does not fit the kind
    /// yields `None`. A trial seed without an explicit expiry lives for
    /// `limits.expiry_days` from `now`.
    pub fn to_stored(&self, now: DateTime<Utc>, limits: &TrialLimits) -> Option<StoredCredential> {
        let subject = self.subject()?;
        let expires_at = match (self.kind, self.expires_at) {
            (CredentialKind::Trial, None) => {
                Some(now + ChronoDuration::days(i64::from(limits.expiry_days)))
            }
            (_, expires_at) => expires_at,
        };
        let key_prefix = self.key_prefix.clone().unwrap_or_else(|| match self.kind {
            CredentialKind::Metered => CredentialKind::METERED_PREFIX.to_string(),
            CredentialKind::Trial => CredentialKind::TRIAL_PREFIX.to_string(),
        });

        Some(StoredCredential {
            id: Uuid::new_v4(),
            kind: self.kind,
            key_hash: self.key_hash.trim().to_lowercase(),
            key_prefix,
            subject,
            created_at: now,
            expires_at,
            revoked_at: self.revoked_at,
            last_used_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn seed(kind: CredentialKind, owner: &str) -> CredentialSeed {
        CredentialSeed {
            kind,
            key_hash: DIGEST.to_uppercase(),
            owner: owner.to_string(),
            key_prefix: None,
            expires_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn metered_seed_needs_uuid_owner() {
        let user = Uuid::new_v4();
        let ok = seed(CredentialKind::Metered, &user.to_string());
        assert_eq!(ok.subject(), Some(Subject::User(user)));

        let bad = seed(CredentialKind::Metered, "not-a-uuid");
        assert_eq!(bad.subject(), None);
        assert!(bad.to_stored(Utc::now(), &TrialLimits::default()).is_none());
    }

    #[test]
    fn trial_seed_becomes_device_credential() {
        let stored = seed(CredentialKind::Trial, " fp-123 ")
            .to_stored(Utc::now(), &TrialLimits::default())
            .unwrap();
        assert_eq!(stored.subject, Subject::Device("fp-123".into()));
        assert_eq!(stored.key_hash, DIGEST);
        assert_eq!(stored.key_prefix, "hw_trial_");
        assert!(stored.last_used_at.is_none());

        assert_eq!(seed(CredentialKind::Trial, "  ").subject(), None);
    }

    #[test]
    fn trial_seed_without_expiry_uses_configured_lifetime() {
        let now = Utc::now();
        let limits = TrialLimits {
            expiry_days: 1,
            ..TrialLimits::default()
        };

        let stored = seed(CredentialKind::Trial, "fp-1")
            .to_stored(now, &limits)
            .unwrap();
        assert_eq!(stored.expires_at, Some(now + ChronoDuration::days(1)));

        let explicit = now + ChronoDuration::hours(3);
        let mut pinned = seed(CredentialKind::Trial, "fp-2");
        pinned.expires_at = Some(explicit);
        let stored = pinned.to_stored(now, &limits).unwrap();
        assert_eq!(stored.expires_at, Some(explicit));

        let metered = seed(CredentialKind::Metered, &Uuid::new_v4().to_string())
            .to_stored(now, &limits)
            .unwrap();
        assert_eq!(metered.expires_at, None);
    }

    #[test]
    fn seeds_parse_from_yaml() {
        let yaml = format!(
            "- kind: trial\n  key_hash: {DIGEST}\n  owner: device-1\n  expires_at: 2030-01-01T00:00:00Z\n"
        );
        let seeds: Vec<CredentialSeed> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].kind, CredentialKind::Trial);
        assert!(seeds[0].expires_at.is_some());
        assert!(seeds[0].revoked_at.is_none());
    }
}
