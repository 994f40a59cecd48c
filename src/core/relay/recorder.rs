use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::state::{MeterSnapshot, SessionMeter};
use crate::core::store::{Finalization, OwnerRef, StoreResult, UsageStatus, UsageStore};
use crate::core::upstream::TranscriptionParams;

/// Message stored when the client socket could not be upgraded.
pub const UPGRADE_FAILED_MESSAGE: &str = "websocket upgrade failed";

/// What the session's usage came to, whether or not it was persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalUsage {
    pub record_id: Option<Uuid>,
    pub status: UsageStatus,
    pub duration_seconds: Option<f64>,
    pub bytes_sent: u64,
    pub streamed: bool,
    pub persisted: bool,
}

struct RecordTarget {
    store: Arc<dyn UsageStore>,
    record_id: Uuid,
}

/// Commits a session's terminal usage exactly once.
///
/// The once-only guard is the finalized flag inside [`SessionMeter`], under
/// the same lock as the byte and duration counters it reads.
pub struct UsageRecorder {
    meter: Arc<SessionMeter>,
    target: Option<RecordTarget>,
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder")
            .field("record_id", &self.record_id())
            .field("finalized", &self.meter.is_finalized())
            .finish()
    }
}

impl UsageRecorder {
    /// Recorder for a session whose usage is not persisted.
    pub fn detached(meter: Arc<SessionMeter>) -> Self {
        Self {
            meter,
            target: None,
        }
    }

    /// Create the `active` usage record for a session that just connected
    /// upstream.
    pub async fn open(
        store: Arc<dyn UsageStore>,
        owner: &OwnerRef,
        params: &TranscriptionParams,
        client_origin: Option<&str>,
        meter: Arc<SessionMeter>,
    ) -> StoreResult<Self> {
        let record_id = store
            .create_usage_record(owner, params, client_origin)
            .await?;
        info!(record_id = %record_id, owner = %owner.subject, "Usage record opened");
        Ok(Self {
            meter,
            target: Some(RecordTarget { store, record_id }),
        })
    }

    /// Persist a session that failed before relaying anything.
    pub async fn record_failure(
        store: &dyn UsageStore,
        owner: &OwnerRef,
        params: &TranscriptionParams,
        client_origin: Option<&str>,
        message: &str,
    ) -> StoreResult<Uuid> {
        let record_id = store
            .create_usage_record(owner, params, client_origin)
            .await?;
        store
            .finalize_usage_record(record_id, Finalization::error(message))
            .await?;
        warn!(record_id = %record_id, owner = %owner.subject, "Session recorded as failed: {}", message);
        Ok(record_id)
    }

    pub fn record_id(&self) -> Option<Uuid> {
        self.target.as_ref().map(|t| t.record_id)
    }

    pub fn meter(&self) -> &Arc<SessionMeter> {
        &self.meter
    }

    /// A captured provider duration means the stream finished cleanly;
    /// without one the session was cut short.
    pub fn status_for(snapshot: &MeterSnapshot) -> UsageStatus {
        match snapshot.duration_seconds {
            Some(d) if d > 0.0 => UsageStatus::Completed,
            _ => UsageStatus::Timeout,
        }
    }

    /// Finalize the session. Only the first call does anything; later calls
    /// return `None`. Storage failures are logged and otherwise ignored.
    pub async fn finalize(&self) -> Option<FinalUsage> {
        let snapshot = self.meter.take_final()?;
        let status = Self::status_for(&snapshot);
        let duration_seconds = match status {
            UsageStatus::Completed => snapshot.duration_seconds,
            _ => None,
        };

        let mut persisted = false;
        if let Some(target) = &self.target {
            let finalization = Finalization {
                status,
                duration_seconds,
                bytes_sent: snapshot.bytes_sent,
                error_message: None,
            };
            match target
                .store
                .finalize_usage_record(target.record_id, finalization)
                .await
            {
                Ok(()) => persisted = true,
                Err(e) => error!(
                    record_id = %target.record_id,
                    status = %status,
                    bytes = snapshot.bytes_sent,
                    "Failed to finalize usage record: {}", e
                ),
            }
        }

        Some(FinalUsage {
            record_id: self.record_id(),
            status,
            duration_seconds,
            bytes_sent: snapshot.bytes_sent,
            streamed: snapshot.streamed,
            persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::state::SessionState;
    use crate::core::store::{MemoryStore, StoreError, Subject, UsageAggregate};
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct BrokenStore;

    #[async_trait]
    impl UsageStore for BrokenStore {
        async fn create_usage_record(
            &self,
            _owner: &OwnerRef,
            _params: &TranscriptionParams,
            _client_origin: Option<&str>,
        ) -> StoreResult<Uuid> {
            Ok(Uuid::new_v4())
        }

        async fn finalize_usage_record(
            &self,
            _id: Uuid,
            _finalization: Finalization,
        ) -> StoreResult<()> {
            Err(StoreError::Backend("disk full".into()))
        }

        async fn aggregate_usage(&self, _owner: &OwnerRef) -> StoreResult<UsageAggregate> {
            Ok(UsageAggregate::default())
        }
    }

    fn owner() -> OwnerRef {
        OwnerRef::new(Uuid::new_v4(), Subject::User(Uuid::new_v4()))
    }

    #[tokio::test]
    async fn finalizes_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let meter = Arc::new(SessionMeter::new());
        let recorder = UsageRecorder::open(
            store.clone(),
            &owner(),
            &TranscriptionParams::default(),
            Some("127.0.0.1"),
            meter.clone(),
        )
        .await
        .unwrap();
        let record_id = recorder.record_id().unwrap();

        meter.advance(SessionState::Streaming);
        meter.add_bytes(300);
        meter.record_duration(1.2);

        let first = recorder.finalize().await.unwrap();
        assert_eq!(first.status, UsageStatus::Completed);
        assert_eq!(first.duration_seconds, Some(1.2));
        assert_eq!(first.bytes_sent, 300);
        assert!(first.persisted);
        assert!(first.streamed);

        // counters moving after the fact change nothing
        meter.add_bytes(50);
        assert!(recorder.finalize().await.is_none());

        let record = store.usage_record(record_id).unwrap();
        assert_eq!(record.status, UsageStatus::Completed);
        assert_eq!(record.bytes_sent, 300);
        assert_eq!(record.duration_seconds, Some(1.2));
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn no_duration_means_timeout() {
        let store = Arc::new(MemoryStore::new());
        let meter = Arc::new(SessionMeter::new());
        let recorder = UsageRecorder::open(
            store.clone(),
            &owner(),
            &TranscriptionParams::default(),
            None,
            meter.clone(),
        )
        .await
        .unwrap();

        meter.add_bytes(640);
        let usage = recorder.finalize().await.unwrap();
        assert_eq!(usage.status, UsageStatus::Timeout);
        assert_eq!(usage.duration_seconds, None);

        let record = store.usage_record(recorder.record_id().unwrap()).unwrap();
        assert_eq!(record.status, UsageStatus::Timeout);
        assert_eq!(record.duration_seconds, None);
        assert_eq!(record.bytes_sent, 640);
    }

    #[tokio::test]
    async fn storage_failure_is_absorbed() {
        let meter = Arc::new(SessionMeter::new());
        let recorder = UsageRecorder::open(
            Arc::new(BrokenStore),
            &owner(),
            &TranscriptionParams::default(),
            None,
            meter,
        )
        .await
        .unwrap();

        let usage = recorder.finalize().await.unwrap();
        assert!(!usage.persisted);
        assert_eq!(usage.status, UsageStatus::Timeout);
    }

    #[tokio::test]
    async fn failure_path_writes_error_record() {
        let store = MemoryStore::new();
        let owner = owner();
        let id = UsageRecorder::record_failure(
            &store,
            &owner,
            &TranscriptionParams::default(),
            Some("198.51.100.4"),
            UPGRADE_FAILED_MESSAGE,
        )
        .await
        .unwrap();

        let record = store.usage_record(id).unwrap();
        assert_eq!(record.status, UsageStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some(UPGRADE_FAILED_MESSAGE));
        assert_eq!(record.bytes_sent, 0);
        assert_eq!(record.duration_seconds, None);
        assert_eq!(store.aggregate_usage(&owner).await.unwrap().sessions, 0);
    }

    #[tokio::test]
    async fn detached_recorder_still_guards_finalization() {
        let meter = Arc::new(SessionMeter::new());
        let recorder = UsageRecorder::detached(meter);
        let usage = recorder.finalize().await.unwrap();
        assert_eq!(usage.record_id, None);
        assert!(!usage.persisted);
        assert!(recorder.finalize().await.is_none());
    }
}
