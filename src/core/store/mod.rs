//! Persistence collaborator seams.
//!
//! The relay talks to storage only through [`CredentialStore`] and
//! [`UsageStore`]. Schema and query mechanics belong to whoever implements
//! them; [`MemoryStore`] is the process-local implementation used by the
//! server binary and the tests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::upstream::TranscriptionParams;

pub mod memory;
pub mod record;

pub use memory::MemoryStore;
pub use record::{
    CredentialKind, Finalization, OwnerRef, StoredCredential, Subject, TrialLimits,
    UsageAggregate, UsageRecord, UsageStatus,
};

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("usage record {0} was already finalized")]
    AlreadyFinalized(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup side of credential storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a credential by the digest of its secret. Never by plaintext.
    async fn find_by_digest(&self, digest: &str) -> StoreResult<Option<StoredCredential>>;

    /// Stamp the credential's "last used" time.
    async fn touch_last_used(&self, id: Uuid) -> StoreResult<()>;

    /// Current trial quota limits.
    async fn trial_limits(&self) -> StoreResult<TrialLimits>;
}

/// Usage metering side of storage.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Create a usage record in `active` state and return its id.
    async fn create_usage_record(
        &self,
        owner: &OwnerRef,
        params: &TranscriptionParams,
        client_origin: Option<&str>,
    ) -> StoreResult<Uuid>;

    /// Move a record to its terminal state. Must be called at most once per id.
    async fn finalize_usage_record(&self, id: Uuid, finalization: Finalization)
    -> StoreResult<()>;

    /// Sum the owner's prior `completed` and `timeout` records.
    async fn aggregate_usage(&self, owner: &OwnerRef) -> StoreResult<UsageAggregate>;
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn find_by_digest(&self, digest: &str) -> StoreResult<Option<StoredCredential>> {
        (**self).find_by_digest(digest).await
    }

    async fn touch_last_used(&self, id: Uuid) -> StoreResult<()> {
        (**self).touch_last_used(id).await
    }

    async fn trial_limits(&self) -> StoreResult<TrialLimits> {
        (**self).trial_limits().await
    }
}

#[async_trait]
impl<S: UsageStore + ?Sized> UsageStore for Arc<S> {
    async fn create_usage_record(
        &self,
        owner: &OwnerRef,
        params: &TranscriptionParams,
        client_origin: Option<&str>,
    ) -> StoreResult<Uuid> {
        (**self)
            .create_usage_record(owner, params, client_origin)
            .await
    }

    async fn finalize_usage_record(
        &self,
        id: Uuid,
        finalization: Finalization,
    ) -> StoreResult<()> {
        (**self).finalize_usage_record(id, finalization).await
    }

    async fn aggregate_usage(&self, owner: &OwnerRef) -> StoreResult<UsageAggregate> {
        (**self).aggregate_usage(owner).await
    }
}
