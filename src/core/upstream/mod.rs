//! Outbound connection to the transcription provider.

pub mod connector;
pub mod messages;
pub mod params;

pub use connector::{DeepgramConnector, UpstreamConnector};
pub use messages::{CLOSE_STREAM_MESSAGE, extract_duration, is_close_stream};
pub use params::{ALLOWED_PARAMS, TranscriptionParams};

use std::time::Duration;

use thiserror::Error;

/// Why the provider connection could not be established.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    #[error("provider rejected the handshake with HTTP {status}")]
    Rejected { status: u16 },

    #[error("provider handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider unreachable: {0}")]
    Unavailable(String),
}
