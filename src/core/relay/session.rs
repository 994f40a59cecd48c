//! One relayed streaming session.
//!
//! Two independent tasks forward frames, one per direction, so audio upload
//! and transcript delivery never block each other. The session ends when both
//! tasks have returned or when the policy's deadline fires, and is finalized
//! exactly once after that.

use std::sync::Arc;

use futures::StreamExt;
use futures::future;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frame::{CloseReason, Frame};
use super::policy::{SessionKind, SessionPolicy};
use super::recorder::{FinalUsage, UsageRecorder};
use super::state::{SessionMeter, SessionState};
use super::transport::{Connection, FrameSink, FrameStream};
use crate::core::store::UsageStatus;
use crate::core::upstream::{CLOSE_STREAM_MESSAGE, extract_duration, is_close_stream};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Both forwarding directions returned on their own.
    StreamsEnded,
    /// The deadline fired and both connections were force-closed.
    DeadlineExceeded,
    /// The provider could not be reached; nothing was relayed.
    UpstreamUnavailable,
    /// The usage record could not be opened; nothing was relayed.
    PersistenceUnavailable,
}

/// Final report of a session, handed to the policy and returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub kind: SessionKind,
    pub record_id: Option<Uuid>,
    pub status: UsageStatus,
    pub duration_seconds: Option<f64>,
    pub bytes_sent: u64,
    pub termination: Termination,
    /// Whether the session ever reached `Streaming`.
    pub streamed: bool,
    pub persisted: bool,
    pub error: Option<String>,
}

impl SessionOutcome {
    pub(crate) fn from_usage(
        session_id: Uuid,
        kind: SessionKind,
        termination: Termination,
        usage: FinalUsage,
    ) -> Self {
        Self {
            session_id,
            kind,
            record_id: usage.record_id,
            status: usage.status,
            duration_seconds: usage.duration_seconds,
            bytes_sent: usage.bytes_sent,
            termination,
            streamed: usage.streamed,
            persisted: usage.persisted,
            error: None,
        }
    }

    /// Outcome of a session that failed before relaying anything.
    pub(crate) fn failed(
        session_id: Uuid,
        kind: SessionKind,
        termination: Termination,
        record_id: Option<Uuid>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            kind,
            record_id,
            status: UsageStatus::Error,
            duration_seconds: None,
            bytes_sent: 0,
            termination,
            streamed: false,
            persisted: record_id.is_some(),
            error: Some(error.into()),
        }
    }
}

pub struct RelaySession {
    id: Uuid,
    policy: Arc<dyn SessionPolicy>,
    recorder: UsageRecorder,
}

impl std::fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySession")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("recorder", &self.recorder)
            .finish()
    }
}

impl RelaySession {
    pub fn new(id: Uuid, policy: Arc<dyn SessionPolicy>, recorder: UsageRecorder) -> Self {
        Self {
            id,
            policy,
            recorder,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn meter(&self) -> &Arc<SessionMeter> {
        self.recorder.meter()
    }

    /// Relay between an accepted client and a connected provider until the
    /// session ends, then finalize it.
    pub async fn run(self, client: Connection, provider: Connection) -> SessionOutcome {
        let meter = self.recorder.meter().clone();
        meter.advance(SessionState::Streaming);

        let Connection {
            sink: client_tx,
            stream: client_rx,
        } = client;
        let Connection {
            sink: provider_tx,
            stream: provider_rx,
        } = provider;

        let deadline = self.policy.compute_deadline();
        info!(
            session_id = %self.id,
            kind = %self.policy.kind(),
            deadline_secs = deadline.map(|d| d.as_secs_f64()),
            "Relay session streaming"
        );

        let mut downstream: JoinHandle<()> = tokio::spawn(pump_client_to_provider(
            self.id,
            client_rx,
            provider_tx.clone(),
            meter.clone(),
        ));
        let mut upstream: JoinHandle<()> = tokio::spawn(pump_provider_to_client(
            self.id,
            provider_rx,
            client_tx.clone(),
            meter.clone(),
        ));

        let termination = {
            let both = future::join(&mut downstream, &mut upstream);
            match deadline {
                Some(limit) => tokio::select! {
                    _ = both => Termination::StreamsEnded,
                    _ = tokio::time::sleep(limit) => Termination::DeadlineExceeded,
                },
                None => {
                    let _ = both.await;
                    Termination::StreamsEnded
                }
            }
        };

        if termination == Termination::DeadlineExceeded {
            info!(session_id = %self.id, "Session deadline reached, closing both connections");
            downstream.abort();
            upstream.abort();
            client_tx
                .close(Some(CloseReason::normal(self.policy.deadline_reason())))
                .await;
            provider_tx.close(None).await;
            meter.advance(SessionState::Closed);
        } else {
            client_tx.close(None).await;
            provider_tx.close(None).await;
            meter.advance(SessionState::Closed);
        }

        self.finish(termination).await
    }

    async fn finish(&self, termination: Termination) -> SessionOutcome {
        let outcome = match self.recorder.finalize().await {
            Some(usage) => {
                SessionOutcome::from_usage(self.id, self.policy.kind(), termination, usage)
            }
            None => {
                // Only reachable if something finalized this meter already
                warn!(session_id = %self.id, "Session was already finalized");
                let meter = self.meter().snapshot();
                SessionOutcome {
                    session_id: self.id,
                    kind: self.policy.kind(),
                    record_id: self.recorder.record_id(),
                    status: UsageRecorder::status_for(&meter),
                    duration_seconds: meter.duration_seconds,
                    bytes_sent: meter.bytes_sent,
                    termination,
                    streamed: meter.streamed,
                    persisted: false,
                    error: None,
                }
            }
        };

        self.policy.on_finalize(&outcome);
        outcome
    }
}

/// Client to provider. Counts audio bytes and makes sure the provider always
/// gets an end-of-stream request, however the client goes away.
async fn pump_client_to_provider(
    session_id: Uuid,
    mut client_rx: FrameStream,
    provider_tx: FrameSink,
    meter: Arc<SessionMeter>,
) {
    loop {
        let frame = match client_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!(session_id = %session_id, "Client read error: {}", e);
                break;
            }
            None => {
                debug!(session_id = %session_id, "Client stream ended");
                break;
            }
        };

        match frame {
            Frame::Binary(data) => {
                let total = meter.add_bytes(data.len() as u64);
                debug!(session_id = %session_id, bytes = data.len(), total, "Audio to provider");
                if let Err(e) = provider_tx.send(Frame::Binary(data)).await {
                    warn!(session_id = %session_id, "Error forwarding to provider: {}", e);
                    return;
                }
            }
            Frame::Text(text) if is_close_stream(&text) => {
                debug!(session_id = %session_id, "Client requested end of stream");
                meter.advance(SessionState::Draining);
                if let Err(e) = provider_tx.send(Frame::Text(text)).await {
                    warn!(session_id = %session_id, "Error forwarding end of stream: {}", e);
                }
                return;
            }
            Frame::Text(text) => {
                debug!(session_id = %session_id, "Client text message: {}", text);
                if let Err(e) = provider_tx.send(Frame::Text(text)).await {
                    warn!(session_id = %session_id, "Error forwarding to provider: {}", e);
                    return;
                }
            }
            // Control frames are answered by each transport on its own
            Frame::Ping(_) | Frame::Pong(_) => {}
            Frame::Close(_) => {
                debug!(session_id = %session_id, "Client sent close");
                break;
            }
        }
    }

    meter.advance(SessionState::Draining);
    if let Err(e) = provider_tx.send(Frame::text(CLOSE_STREAM_MESSAGE)).await {
        debug!(session_id = %session_id, "Could not send end of stream to provider: {}", e);
    }
}

/// Provider to client. Keeps reading after the client is gone so the final
/// duration-bearing message is still captured.
async fn pump_provider_to_client(
    session_id: Uuid,
    mut provider_rx: FrameStream,
    client_tx: FrameSink,
    meter: Arc<SessionMeter>,
) {
    let mut client_gone = false;

    while let Some(item) = provider_rx.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %session_id, "Provider read error: {}", e);
                break;
            }
        };

        match &frame {
            Frame::Text(text) => {
                if let Some(duration) = extract_duration(text) {
                    meter.record_duration(duration);
                    debug!(session_id = %session_id, duration, "Provider reported duration");
                }
            }
            Frame::Binary(_) => {}
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Close(reason) => {
                debug!(session_id = %session_id, ?reason, "Provider closed the stream");
                break;
            }
        }

        if client_gone {
            continue;
        }
        if let Err(e) = client_tx.send(frame).await {
            debug!(
                session_id = %session_id,
                "Client unavailable ({}), still reading provider for final metadata", e
            );
            client_gone = true;
        }
    }

    client_tx.close(None).await;
}
