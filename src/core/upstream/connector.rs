use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    http::{HeaderValue, header::AUTHORIZATION},
};
use tracing::{debug, info, warn};
use url::Url;

use super::{TranscriptionParams, UpstreamError};
use crate::core::relay::Connection;

/// Default provider streaming endpoint.
pub const DEFAULT_DEEPGRAM_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Default bound on the provider handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens one authenticated streaming connection per session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self, params: &TranscriptionParams) -> Result<Connection, UpstreamError>;
}

/// Connector for the Deepgram live transcription API.
///
/// The provider credential comes from process configuration only; nothing
/// the client sends besides whitelisted parameters reaches the provider URL.
#[derive(Clone)]
pub struct DeepgramConnector {
    base_url: Url,
    api_key: String,
    handshake_timeout: Duration,
}

impl std::fmt::Debug for DeepgramConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepgramConnector")
            .field("base_url", &self.base_url.as_str())
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl DeepgramConnector {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        handshake_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let base_url =
            Url::parse(base_url).map_err(|e| UpstreamError::InvalidUrl(format!("{base_url}: {e}")))?;
        match base_url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(UpstreamError::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        }

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            handshake_timeout,
        })
    }

    /// Provider URL for a session, carrying only the whitelisted parameters.
    pub fn session_url(&self, params: &TranscriptionParams) -> Url {
        let mut url = self.base_url.clone();
        params.apply_to(&mut url);
        url
    }
}

#[async_trait]
impl UpstreamConnector for DeepgramConnector {
    async fn connect(&self, params: &TranscriptionParams) -> Result<Connection, UpstreamError> {
        let url = self.session_url(params);
        debug!(url = %url, "Connecting to transcription provider");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        let token = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|_| UpstreamError::Unavailable("provider api key is not a valid header".into()))?;
        request.headers_mut().insert(AUTHORIZATION, token);

        let (stream, response) = match timeout(self.handshake_timeout, connect_async(request)).await
        {
            Err(_) => return Err(UpstreamError::Timeout(self.handshake_timeout)),
            Ok(Err(tungstenite::Error::Http(response))) => {
                let status = response.status().as_u16();
                warn!(status, "Transcription provider rejected handshake");
                return Err(UpstreamError::Rejected { status });
            }
            Ok(Err(e)) => return Err(UpstreamError::Unavailable(e.to_string())),
            Ok(Ok(connected)) => connected,
        };

        info!(status = response.status().as_u16(), "Connected to transcription provider");
        Ok(Connection::from_provider_stream(stream))
    }
}
