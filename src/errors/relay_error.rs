use thiserror::Error;

use crate::core::store::StoreError;
use crate::core::upstream::UpstreamError;

/// Failures inside a running relay session.
///
/// None of these reach the client as an HTTP response: once the socket is
/// upgraded, failures are absorbed into the session's terminal usage status.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("client transport error: {0}")]
    Client(String),

    #[error("provider transport error: {0}")]
    Provider(String),

    #[error("{0} connection already closed")]
    Closed(&'static str),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RelayError {
    pub fn client<E: std::fmt::Display>(err: E) -> Self {
        Self::Client(err.to_string())
    }

    pub fn provider<E: std::fmt::Display>(err: E) -> Self {
        Self::Provider(err.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
