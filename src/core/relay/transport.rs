use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures::future;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as ProviderMessage;
use tracing::debug;

use super::frame::{CloseReason, Frame};
use crate::errors::RelayError;

/// Upper bound on flushing a close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub type FrameStream = BoxStream<'static, Result<Frame, RelayError>>;

type BoxFrameSink = Pin<Box<dyn Sink<Frame, Error = RelayError> + Send>>;

/// Write half of a connection, shareable between the forwarding loops and
/// the deadline path.
///
/// Closing is idempotent: the first call sends the optional close frame and
/// shuts the sink, every later call is a no-op. Sends after close fail with
/// [`RelayError::Closed`].
#[derive(Clone)]
pub struct FrameSink {
    inner: Arc<Mutex<BoxFrameSink>>,
    closed: Arc<AtomicBool>,
    peer: &'static str,
}

impl FrameSink {
    pub fn new<S>(peer: &'static str, sink: S) -> Self
    where
        S: Sink<Frame, Error = RelayError> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::pin(sink))),
            closed: Arc::new(AtomicBool::new(false)),
            peer,
        }
    }

    pub fn peer(&self) -> &'static str {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn send(&self, frame: Frame) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::Closed(self.peer));
        }
        let mut sink = self.inner.lock().await;
        sink.send(frame).await
    }

    /// Close the connection, optionally telling the peer why.
    pub async fn close(&self, reason: Option<CloseReason>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let peer = self.peer;
        let inner = self.inner.clone();
        let shutdown = async move {
            let mut sink = inner.lock().await;
            if let Some(reason) = reason {
                if let Err(e) = sink.send(Frame::Close(Some(reason))).await {
                    debug!(peer, "Close frame not delivered: {}", e);
                }
            }
            if let Err(e) = sink.close().await {
                debug!(peer, "Error closing sink: {}", e);
            }
        };

        if timeout(CLOSE_TIMEOUT, shutdown).await.is_err() {
            debug!(peer, "Timed out closing connection");
        }
    }
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Both halves of one WebSocket connection, already converted to [`Frame`]s.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new<Si, St>(peer: &'static str, sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = RelayError> + Send + 'static,
        St: Stream<Item = Result<Frame, RelayError>> + Send + 'static,
    {
        Self {
            sink: FrameSink::new(peer, sink),
            stream: stream.boxed(),
        }
    }

    /// Wrap an upgraded inbound socket.
    pub fn from_client_socket(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(RelayError::client)
            .with(|frame: Frame| future::ready(Ok::<_, RelayError>(ClientMessage::from(frame))));
        let stream = stream.map(|item| item.map(Frame::from).map_err(RelayError::client));
        Self::new("client", sink, stream)
    }

    /// Wrap an established provider socket.
    pub fn from_provider_stream<S>(socket: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(RelayError::provider)
            .with(|frame: Frame| future::ready(Ok::<_, RelayError>(ProviderMessage::from(frame))));
        let stream = stream.filter_map(|item| {
            future::ready(match item {
                Ok(message) => Frame::from_provider(message).map(Ok),
                Err(e) => Some(Err(RelayError::provider(e))),
            })
        });
        Self::new("provider", sink, stream)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}
