use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use uuid::Uuid;

use super::policy::{SESSION_LIMIT_REASON, TRIAL_LIMIT_REASON};
use super::*;
use crate::core::quota::QuotaSnapshot;
use crate::core::store::{MemoryStore, OwnerRef, Subject, UsageStatus, UsageStore};
use crate::core::upstream::{CLOSE_STREAM_MESSAGE, TranscriptionParams};
use crate::errors::RelayError;

/// The far end of an in-memory connection handed to the relay.
pub(crate) struct Peer {
    tx: mpsc::UnboundedSender<Result<Frame, RelayError>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Peer {
    pub(crate) fn send(&self, frame: Frame) {
        self.tx
            .unbounded_send(Ok(frame))
            .expect("relay stopped reading");
    }

    /// End the stream the relay reads from.
    pub(crate) fn hang_up(&self) {
        self.tx.close_channel();
    }

    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        timeout(Duration::from_secs(30), self.rx.next())
            .await
            .expect("timed out waiting for a frame")
    }

    /// Stop reading; sends from the relay fail from now on.
    pub(crate) fn stop_reading(&mut self) {
        self.rx.close();
    }
}

pub(crate) fn pipe(peer: &'static str) -> (Connection, Peer) {
    let (out_tx, out_rx) = mpsc::unbounded::<Frame>();
    let (in_tx, in_rx) = mpsc::unbounded::<Result<Frame, RelayError>>();
    let sink = out_tx.sink_map_err(RelayError::client);
    (
        Connection::new(peer, sink, in_rx),
        Peer {
            tx: in_tx,
            rx: out_rx,
        },
    )
}

pub(crate) fn audio(len: usize) -> Frame {
    Frame::Binary(Bytes::from(vec![0u8; len]))
}

fn metered_owner() -> OwnerRef {
    OwnerRef::new(Uuid::new_v4(), Subject::User(Uuid::new_v4()))
}

async fn persisted_session(
    store: &Arc<MemoryStore>,
    owner: &OwnerRef,
    policy: Arc<dyn SessionPolicy>,
) -> (RelaySession, Uuid) {
    let meter = Arc::new(SessionMeter::new());
    let recorder = UsageRecorder::open(
        store.clone(),
        owner,
        &TranscriptionParams::from_pairs([("model", "nova-2")]),
        Some("203.0.113.9"),
        meter,
    )
    .await
    .unwrap();
    let record_id = recorder.record_id().unwrap();
    (RelaySession::new(Uuid::new_v4(), policy, recorder), record_id)
}

fn metered_policy() -> Arc<dyn SessionPolicy> {
    Arc::new(MeteredPolicy {
        key_label: "hw_live_abcd...".into(),
        ceiling: None,
    })
}

#[tokio::test]
async fn graceful_finish_records_provider_duration() {
    let store = Arc::new(MemoryStore::new());
    let (session, record_id) = persisted_session(&store, &metered_owner(), metered_policy()).await;
    let meter = session.meter().clone();

    let (client, mut client_peer) = pipe("client");
    let (provider, mut provider_peer) = pipe("provider");
    let handle = tokio::spawn(session.run(client, provider));

    for _ in 0..3 {
        client_peer.send(audio(100));
    }
    client_peer.send(Frame::text(CLOSE_STREAM_MESSAGE));

    for _ in 0..3 {
        assert_eq!(provider_peer.recv().await, Some(audio(100)));
    }
    assert_eq!(
        provider_peer.recv().await,
        Some(Frame::text(CLOSE_STREAM_MESSAGE))
    );
    assert_eq!(meter.state(), SessionState::Draining);

    let metadata = r#"{"type":"Metadata","request_id":"r1","duration":1.2,"channels":1}"#;
    provider_peer.send(Frame::text(metadata));
    provider_peer.hang_up();

    assert_eq!(client_peer.recv().await, Some(Frame::text(metadata)));

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.status, UsageStatus::Completed);
    assert_eq!(outcome.duration_seconds, Some(1.2));
    assert_eq!(outcome.bytes_sent, 300);
    assert_eq!(outcome.termination, Termination::StreamsEnded);
    assert_eq!(outcome.record_id, Some(record_id));
    assert!(outcome.persisted);
    assert!(outcome.streamed);
    assert_eq!(meter.state(), SessionState::Closed);

    let record = store.usage_record(record_id).unwrap();
    assert_eq!(record.status, UsageStatus::Completed);
    assert_eq!(record.duration_seconds, Some(1.2));
    assert_eq!(record.bytes_sent, 300);
    assert_eq!(record.client_origin.as_deref(), Some("203.0.113.9"));

    // both sides are closed once the session is over
    assert_eq!(client_peer.recv().await, None);
    assert_eq!(provider_peer.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn trial_deadline_force_closes_both_sides() {
    let store = Arc::new(MemoryStore::new());
    let owner = OwnerRef::new(Uuid::new_v4(), Subject::Device("device-42".into()));
    let policy = Arc::new(TrialPolicy {
        key_label: "hw_trial_abcdefg...".into(),
        deadline: Duration::from_secs(5),
        quota: QuotaSnapshot {
            used_duration_seconds: 1795.0,
            used_sessions: 4,
            remaining_duration_seconds: 5.0,
            remaining_sessions: 16,
        },
    });
    let (session, record_id) = persisted_session(&store, &owner, policy).await;

    let (client, mut client_peer) = pipe("client");
    let (provider, mut provider_peer) = pipe("provider");
    let started = tokio::time::Instant::now();
    let handle = tokio::spawn(session.run(client, provider));

    client_peer.send(audio(160));
    client_peer.send(audio(160));
    assert_eq!(provider_peer.recv().await, Some(audio(160)));
    assert_eq!(provider_peer.recv().await, Some(audio(160)));

    let outcome = handle.await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(outcome.termination, Termination::DeadlineExceeded);
    assert_eq!(outcome.status, UsageStatus::Timeout);
    assert_eq!(outcome.duration_seconds, None);
    assert_eq!(outcome.bytes_sent, 320);

    assert_eq!(
        client_peer.recv().await,
        Some(Frame::Close(Some(CloseReason::normal(TRIAL_LIMIT_REASON))))
    );
    assert_eq!(client_peer.recv().await, None);
    assert_eq!(provider_peer.recv().await, None);

    let record = store.usage_record(record_id).unwrap();
    assert_eq!(record.status, UsageStatus::Timeout);
    assert_eq!(record.bytes_sent, 320);
    assert_eq!(record.duration_seconds, None);

    let aggregate = store.aggregate_usage(&owner).await.unwrap();
    assert_eq!(aggregate.sessions, 1);
    assert_eq!(aggregate.total_duration_seconds, 0.0);
}

#[tokio::test(start_paused = true)]
async fn deadline_after_reported_duration_is_completed() {
    let store = Arc::new(MemoryStore::new());
    let policy = Arc::new(MeteredPolicy {
        key_label: "hw_live_abcd...".into(),
        ceiling: Some(Duration::from_secs(5)),
    });
    let (session, record_id) = persisted_session(&store, &metered_owner(), policy).await;

    let (client, mut client_peer) = pipe("client");
    let (provider, mut provider_peer) = pipe("provider");
    let handle = tokio::spawn(session.run(client, provider));

    client_peer.send(audio(256));
    assert_eq!(provider_peer.recv().await, Some(audio(256)));

    let results = r#"{"type":"Results","is_final":true,"metadata":{"duration":2.0}}"#;
    provider_peer.send(Frame::text(results));
    assert_eq!(client_peer.recv().await, Some(Frame::text(results)));

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.termination, Termination::DeadlineExceeded);
    assert_eq!(outcome.status, UsageStatus::Completed);
    assert_eq!(outcome.duration_seconds, Some(2.0));
    assert_eq!(outcome.bytes_sent, 256);

    assert_eq!(
        client_peer.recv().await,
        Some(Frame::Close(Some(CloseReason::normal(SESSION_LIMIT_REASON))))
    );

    let record = store.usage_record(record_id).unwrap();
    assert_eq!(record.status, UsageStatus::Completed);
    assert_eq!(record.duration_seconds, Some(2.0));
    assert_eq!(record.bytes_sent, 256);
}

#[tokio::test]
async fn client_disconnect_still_captures_final_metadata() {
    let store = Arc::new(MemoryStore::new());
    let (session, record_id) = persisted_session(&store, &metered_owner(), metered_policy()).await;

    let (client, mut client_peer) = pipe("client");
    let (provider, mut provider_peer) = pipe("provider");
    let handle = tokio::spawn(session.run(client, provider));

    client_peer.send(audio(64));
    assert_eq!(provider_peer.recv().await, Some(audio(64)));

    // client vanishes without sending the end-of-stream request
    client_peer.hang_up();
    client_peer.stop_reading();
    assert_eq!(
        provider_peer.recv().await,
        Some(Frame::text(CLOSE_STREAM_MESSAGE))
    );

    provider_peer.send(Frame::text(
        r#"{"type":"Results","is_final":true,"metadata":{"request_id":"r2","duration":0.8}}"#,
    ));
    provider_peer.hang_up();

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.status, UsageStatus::Completed);
    assert_eq!(outcome.duration_seconds, Some(0.8));
    assert_eq!(outcome.bytes_sent, 64);

    let record = store.usage_record(record_id).unwrap();
    assert_eq!(record.status, UsageStatus::Completed);
    assert_eq!(record.duration_seconds, Some(0.8));
}

#[tokio::test]
async fn provider_close_without_metadata_is_timeout() {
    let store = Arc::new(MemoryStore::new());
    let (session, record_id) = persisted_session(&store, &metered_owner(), metered_policy()).await;

    let (client, mut client_peer) = pipe("client");
    let (provider, mut provider_peer) = pipe("provider");
    let handle = tokio::spawn(session.run(client, provider));

    client_peer.send(audio(32));
    assert_eq!(provider_peer.recv().await, Some(audio(32)));

    provider_peer.send(Frame::Close(Some(CloseReason::normal("bye"))));
    // the close is not forwarded; the client connection is simply shut
    assert_eq!(client_peer.recv().await, None);

    client_peer.hang_up();
    assert_eq!(
        provider_peer.recv().await,
        Some(Frame::text(CLOSE_STREAM_MESSAGE))
    );

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.status, UsageStatus::Timeout);
    assert_eq!(outcome.bytes_sent, 32);
    assert_eq!(
        store.usage_record(record_id).unwrap().status,
        UsageStatus::Timeout
    );
}

#[tokio::test]
async fn dashboard_session_keeps_last_duration_and_persists_nothing() {
    let meter = Arc::new(SessionMeter::new());
    let policy = Arc::new(DashboardPolicy {
        user_id: Uuid::new_v4(),
        ceiling: Duration::from_secs(300),
    });
    let session = RelaySession::new(Uuid::new_v4(), policy, UsageRecorder::detached(meter));

    let (client, mut client_peer) = pipe("client");
    let (provider, mut provider_peer) = pipe("provider");
    let handle = tokio::spawn(session.run(client, provider));

    client_peer.send(Frame::text(r#"{"type":"KeepAlive"}"#));
    client_peer.send(audio(10));
    client_peer.send(Frame::text(r#"{ "type": "CloseStream" }"#));

    assert_eq!(
        provider_peer.recv().await,
        Some(Frame::text(r#"{"type":"KeepAlive"}"#))
    );
    assert_eq!(provider_peer.recv().await, Some(audio(10)));
    assert_eq!(
        provider_peer.recv().await,
        Some(Frame::text(r#"{ "type": "CloseStream" }"#))
    );

    let first = r#"{"type":"Results","metadata":{"duration":1.0}}"#;
    let last = r#"{"type":"Metadata","duration":2.5}"#;
    provider_peer.send(Frame::text(first));
    provider_peer.send(Frame::text(last));
    provider_peer.hang_up();

    assert_eq!(client_peer.recv().await, Some(Frame::text(first)));
    assert_eq!(client_peer.recv().await, Some(Frame::text(last)));

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.kind, SessionKind::Dashboard);
    assert_eq!(outcome.status, UsageStatus::Completed);
    assert_eq!(outcome.duration_seconds, Some(2.5));
    assert_eq!(outcome.bytes_sent, 10);
    assert_eq!(outcome.record_id, None);
    assert!(!outcome.persisted);
}
