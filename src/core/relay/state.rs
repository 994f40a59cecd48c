use parking_lot::Mutex;

/// Lifecycle of one relay session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Waiting for the provider handshake.
    Connecting,
    /// Both forwarding directions running.
    Streaming,
    /// The client asked to finish (or went away); waiting for the provider's
    /// final messages.
    Draining,
    /// Terminal.
    Closed,
}

/// Counters captured at finalization time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub bytes_sent: u64,
    pub duration_seconds: Option<f64>,
    pub state: SessionState,
    pub streamed: bool,
}

#[derive(Debug)]
struct MeterInner {
    state: SessionState,
    streamed: bool,
    bytes_sent: u64,
    duration_seconds: Option<f64>,
    finalized: bool,
}

/// Per-session shared counters: audio bytes forwarded, last provider-reported
/// duration, and the finalized flag. All three live behind one lock.
#[derive(Debug)]
pub struct SessionMeter {
    inner: Mutex<MeterInner>,
}

impl Default for SessionMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMeter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                state: SessionState::Connecting,
                streamed: false,
                bytes_sent: 0,
                duration_seconds: None,
                finalized: false,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Move to `next` if that is forward of the current state.
    /// Returns whether the state changed.
    pub fn advance(&self, next: SessionState) -> bool {
        let mut inner = self.inner.lock();
        if next <= inner.state {
            return false;
        }
        inner.state = next;
        if next == SessionState::Streaming {
            inner.streamed = true;
        }
        true
    }

    /// Count forwarded audio bytes; returns the running total.
    pub fn add_bytes(&self, len: u64) -> u64 {
        let mut inner = self.inner.lock();
        inner.bytes_sent = inner.bytes_sent.saturating_add(len);
        inner.bytes_sent
    }

    /// Remember a provider-reported duration. Later values replace earlier
    /// ones; non-positive or non-finite values are ignored.
    pub fn record_duration(&self, seconds: f64) -> bool {
        if !seconds.is_finite() || seconds <= 0.0 {
            return false;
        }
        self.inner.lock().duration_seconds = Some(seconds);
        true
    }

    pub fn bytes_sent(&self) -> u64 {
        self.inner.lock().bytes_sent
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.inner.lock().duration_seconds
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.lock().finalized
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        let inner = self.inner.lock();
        MeterSnapshot {
            bytes_sent: inner.bytes_sent,
            duration_seconds: inner.duration_seconds,
            state: inner.state,
            streamed: inner.streamed,
        }
    }

    /// Claim the one finalization of this session. The first caller gets the
    /// final counters and the session is marked closed; everyone after that
    /// gets `None`.
    pub fn take_final(&self) -> Option<MeterSnapshot> {
        let mut inner = self.inner.lock();
        if inner.finalized {
            return None;
        }
        inner.finalized = true;
        inner.state = SessionState::Closed;
        Some(MeterSnapshot {
            bytes_sent: inner.bytes_sent,
            duration_seconds: inner.duration_seconds,
            state: inner.state,
            streamed: inner.streamed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn state_only_moves_forward() {
        let meter = SessionMeter::new();
        assert_eq!(meter.state(), SessionState::Connecting);
        assert!(meter.advance(SessionState::Streaming));
        assert!(meter.advance(SessionState::Draining));
        assert!(!meter.advance(SessionState::Streaming));
        assert!(!meter.advance(SessionState::Draining));
        assert_eq!(meter.state(), SessionState::Draining);
        assert!(meter.advance(SessionState::Closed));
        assert!(meter.snapshot().streamed);
    }

    #[test]
    fn skipping_streaming_is_recorded() {
        let meter = SessionMeter::new();
        meter.advance(SessionState::Closed);
        assert!(!meter.snapshot().streamed);
    }

    #[test]
    fn last_positive_duration_wins() {
        let meter = SessionMeter::new();
        assert!(meter.record_duration(0.5));
        assert!(!meter.record_duration(0.0));
        assert!(!meter.record_duration(f64::NAN));
        assert!(meter.record_duration(1.2));
        assert!(!meter.record_duration(-4.0));
        assert_eq!(meter.duration_seconds(), Some(1.2));
    }

    #[test]
    fn finalization_is_claimed_once_across_threads() {
        let meter = Arc::new(SessionMeter::new());
        meter.add_bytes(100);
        meter.add_bytes(200);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let meter = meter.clone();
                std::thread::spawn(move || meter.take_final())
            })
            .collect();

        let claimed: Vec<MeterSnapshot> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].bytes_sent, 300);
        assert_eq!(claimed[0].state, SessionState::Closed);
        assert!(meter.is_finalized());
    }
}
