//! Transport-neutral WebSocket frame.
//!
//! The client side speaks axum's message type and the provider side speaks
//! tungstenite's; the relay loops only ever see [`Frame`].

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage};
use bytes::Bytes;
use tokio_tungstenite::tungstenite::protocol::{
    CloseFrame as ProviderCloseFrame, frame::coding::CloseCode,
};
use tokio_tungstenite::tungstenite::Message as ProviderMessage;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Server-side failure (provider unreachable, storage unavailable).
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_NORMAL, reason)
    }

    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_INTERNAL_ERROR, reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Convert a provider message; raw frames never surface from a reader
    /// and are dropped.
    pub fn from_provider(message: ProviderMessage) -> Option<Self> {
        let frame = match message {
            ProviderMessage::Text(text) => Self::Text(text.as_str().to_owned()),
            ProviderMessage::Binary(data) => Self::Binary(data),
            ProviderMessage::Ping(data) => Self::Ping(data),
            ProviderMessage::Pong(data) => Self::Pong(data),
            ProviderMessage::Close(frame) => Self::Close(frame.map(|f| CloseReason {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned(),
            })),
            ProviderMessage::Frame(_) => return None,
        };
        Some(frame)
    }
}

impl From<ClientMessage> for Frame {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::Text(text) => Self::Text(text.as_str().to_owned()),
            ClientMessage::Binary(data) => Self::Binary(data),
            ClientMessage::Ping(data) => Self::Ping(data),
            ClientMessage::Pong(data) => Self::Pong(data),
            ClientMessage::Close(frame) => Self::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for ClientMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ClientMessage::Text(text.into()),
            Frame::Binary(data) => ClientMessage::Binary(data),
            Frame::Ping(data) => ClientMessage::Ping(data),
            Frame::Pong(data) => ClientMessage::Pong(data),
            Frame::Close(reason) => ClientMessage::Close(reason.map(|r| ClientCloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }
}

impl From<Frame> for ProviderMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ProviderMessage::Text(text.into()),
            Frame::Binary(data) => ProviderMessage::Binary(data),
            Frame::Ping(data) => ProviderMessage::Ping(data),
            Frame::Pong(data) => ProviderMessage::Pong(data),
            Frame::Close(reason) => ProviderMessage::Close(reason.map(|r| ProviderCloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            })),
        }
    }
}
