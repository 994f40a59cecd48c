//! Provider message shapes that the relay needs to look inside.
//!
//! Frames are forwarded verbatim; these types exist only to pull the
//! authoritative audio duration out of the provider's JSON messages.

use serde::{Deserialize, Serialize};

/// Text control frame a client sends to request a graceful finish.
pub const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

/// Top-level provider message, distinguished by `type`
/// (`Results`, `Metadata`, `UtteranceEnd`, `SpeechStarted`, `Error`).
#[derive(Debug, Deserialize, Serialize)]
pub struct ProviderResponse {
    #[serde(rename = "type", default)]
    pub response_type: Option<String>,
    pub duration: Option<f64>,
    pub start: Option<f64>,
    pub is_final: Option<bool>,
    pub speech_final: Option<bool>,
    pub metadata: Option<ProviderMetadata>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProviderMetadata {
    pub request_id: Option<String>,
    pub duration: Option<f64>,
    pub channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ClientControl {
    #[serde(rename = "type")]
    message_type: String,
}

impl ProviderResponse {
    /// Audio duration this message reports for the whole stream, if any.
    ///
    /// A `Metadata` message carries it at the top level; other messages may
    /// nest it under `metadata`. Zero and negative values are ignored.
    pub fn reported_duration(&self) -> Option<f64> {
        let top_level = match self.response_type.as_deref() {
            Some("Metadata") => self.duration.filter(|d| *d > 0.0),
            _ => None,
        };
        let nested = self
            .metadata
            .as_ref()
            .and_then(|m| m.duration)
            .filter(|d| *d > 0.0);
        nested.or(top_level)
    }
}

/// Parse a provider text frame and return the duration it reports.
/// Frames that are not JSON are treated as carrying nothing.
pub fn extract_duration(text: &str) -> Option<f64> {
    serde_json::from_str::<ProviderResponse>(text)
        .ok()
        .and_then(|response| response.reported_duration())
}

/// Whether a client text frame is the end-of-stream request.
pub fn is_close_stream(text: &str) -> bool {
    if text == CLOSE_STREAM_MESSAGE {
        return true;
    }
    serde_json::from_str::<ClientControl>(text)
        .map(|control| control.message_type == "CloseStream")
        .unwrap_or(false)
}
