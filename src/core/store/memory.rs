//! In-memory storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::record::{
    Finalization, OwnerRef, StoredCredential, TrialLimits, UsageAggregate, UsageRecord,
    UsageStatus,
};
use super::{CredentialStore, StoreError, StoreResult, UsageStore};
use crate::core::upstream::TranscriptionParams;

/// Process-local credential and usage storage.
///
/// Suitable for a single relay instance with a fixed set of seeded
/// credentials. Usage records live as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Credentials keyed by the digest of their secret
    credentials: RwLock<HashMap<String, StoredCredential>>,
    usage: RwLock<HashMap<Uuid, UsageRecord>>,
    limits: RwLock<TrialLimits>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trial_limits(limits: TrialLimits) -> Self {
        Self {
            limits: RwLock::new(limits),
            ..Self::default()
        }
    }

    /// Insert or replace a credential, indexed by its digest.
    pub fn insert_credential(&self, credential: StoredCredential) {
        self.credentials
            .write()
            .insert(credential.key_hash.clone(), credential);
    }

    /// Mark a credential revoked. Returns false when the id is unknown.
    pub fn revoke_credential(&self, id: Uuid, at: DateTime<Utc>) -> bool {
        let mut credentials = self.credentials.write();
        match credentials.values_mut().find(|c| c.id == id) {
            Some(credential) => {
                credential.revoked_at = Some(at);
                true
            }
            None => false,
        }
    }

    pub fn credential(&self, id: Uuid) -> Option<StoredCredential> {
        self.credentials
            .read()
            .values()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn set_trial_limits(&self, limits: TrialLimits) {
        *self.limits.write() = limits;
    }

    pub fn usage_record(&self, id: Uuid) -> Option<UsageRecord> {
        self.usage.read().get(&id).cloned()
    }

    /// All usage records of one credential, oldest first.
    pub fn usage_records_for(&self, credential_id: Uuid) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> = self
            .usage
            .read()
            .values()
            .filter(|r| r.owner.credential_id == credential_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.started_at);
        records
    }

    pub fn usage_record_count(&self) -> usize {
        self.usage.read().len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_digest(&self, digest: &str) -> StoreResult<Option<StoredCredential>> {
        Ok(self.credentials.read().get(digest).cloned())
    }

    async fn touch_last_used(&self, id: Uuid) -> StoreResult<()> {
        let mut credentials = self.credentials.write();
        let credential = credentials
            .values_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound(id))?;
        credential.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn trial_limits(&self) -> StoreResult<TrialLimits> {
        Ok(*self.limits.read())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn create_usage_record(
        &self,
        owner: &OwnerRef,
        params: &TranscriptionParams,
        client_origin: Option<&str>,
    ) -> StoreResult<Uuid> {
        let record = UsageRecord {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            status: UsageStatus::Active,
            error_message: None,
            bytes_sent: 0,
            params: params.clone(),
            client_origin: client_origin.map(str::to_owned),
        };
        let id = record.id;
        self.usage.write().insert(id, record);
        Ok(id)
    }

    async fn finalize_usage_record(
        &self,
        id: Uuid,
        finalization: Finalization,
    ) -> StoreResult<()> {
        let mut usage = self.usage.write();
        let record = usage.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status.is_terminal() {
            return Err(StoreError::AlreadyFinalized(id));
        }

        record.status = finalization.status;
        record.ended_at = Some(Utc::now());
        record.duration_seconds = finalization.duration_seconds;
        record.bytes_sent = finalization.bytes_sent;
        record.error_message = finalization.error_message;
        Ok(())
    }

    async fn aggregate_usage(&self, owner: &OwnerRef) -> StoreResult<UsageAggregate> {
        let usage = self.usage.read();
        let aggregate = usage
            .values()
            .filter(|r| r.owner.credential_id == owner.credential_id && r.status.is_billable())
            .fold(UsageAggregate::default(), |mut acc, record| {
                acc.sessions += 1;
                acc.total_duration_seconds += record.duration_seconds.unwrap_or(0.0);
                acc
            });
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{CredentialKind, Subject};

    fn owner() -> OwnerRef {
        OwnerRef::new(Uuid::new_v4(), Subject::Device("fingerprint-1".to_string()))
    }

    fn completed(duration: f64, bytes: u64) -> Finalization {
        Finalization {
            status: UsageStatus::Completed,
            duration_seconds: Some(duration),
            bytes_sent: bytes,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn finalize_happens_once() {
        let store = MemoryStore::new();
        let owner = owner();
        let id = store
            .create_usage_record(&owner, &TranscriptionParams::default(), Some("10.0.0.1"))
            .await
            .unwrap();

        let record = store.usage_record(id).unwrap();
        assert_eq!(record.status, UsageStatus::Active);
        assert_eq!(record.client_origin.as_deref(), Some("10.0.0.1"));

        store
            .finalize_usage_record(id, completed(1.5, 320))
            .await
            .unwrap();
        let second = store.finalize_usage_record(id, completed(9.0, 999)).await;
        assert!(matches!(second, Err(StoreError::AlreadyFinalized(_))));

        let record = store.usage_record(id).unwrap();
        assert_eq!(record.status, UsageStatus::Completed);
        assert_eq!(record.duration_seconds, Some(1.5));
        assert_eq!(record.bytes_sent, 320);
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn aggregate_counts_completed_and_timeout_only() {
        let store = MemoryStore::new();
        let owner = owner();
        let params = TranscriptionParams::default();

        let a = store.create_usage_record(&owner, &params, None).await.unwrap();
        store.finalize_usage_record(a, completed(12.5, 10)).await.unwrap();

        let b = store.create_usage_record(&owner, &params, None).await.unwrap();
        store
            .finalize_usage_record(
                b,
                Finalization {
                    status: UsageStatus::Timeout,
                    duration_seconds: None,
                    bytes_sent: 40,
                    error_message: None,
                },
            )
            .await
            .unwrap();

        let c = store.create_usage_record(&owner, &params, None).await.unwrap();
        store
            .finalize_usage_record(c, Finalization::error("deepgram connection failed"))
            .await
            .unwrap();

        // still active, not counted
        store.create_usage_record(&owner, &params, None).await.unwrap();

        // someone else's record
        let other = store
            .create_usage_record(&super::tests::owner(), &params, None)
            .await
            .unwrap();
        store.finalize_usage_record(other, completed(100.0, 1)).await.unwrap();

        let aggregate = store.aggregate_usage(&owner).await.unwrap();
        assert_eq!(aggregate.sessions, 2);
        assert!((aggregate.total_duration_seconds - 12.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn finds_credentials_by_digest_and_tracks_last_use() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.insert_credential(StoredCredential {
            id,
            kind: CredentialKind::Metered,
            key_hash: "ab".repeat(32),
            key_prefix: "hw_live_abcd".to_string(),
            subject: Subject::User(Uuid::new_v4()),
            created_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            last_used_at: None,
        });

        assert!(store.find_by_digest(&"cd".repeat(32)).await.unwrap().is_none());
        let found = store.find_by_digest(&"ab".repeat(32)).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(found.last_used_at.is_none());

        store.touch_last_used(id).await.unwrap();
        assert!(store.credential(id).unwrap().last_used_at.is_some());

        assert!(store.revoke_credential(id, Utc::now()));
        assert!(store.credential(id).unwrap().is_revoked());
        assert!(!store.revoke_credential(Uuid::new_v4(), Utc::now()));
    }
}
