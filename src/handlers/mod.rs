//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `listen` - Metered, trial and dashboard transcription sessions
//! - `trial` - Trial key status and usage

pub mod api;
pub mod listen;
pub mod trial;

pub use listen::{dashboard_listen_handler, listen_handler};
pub use trial::{trial_status_handler, trial_usage_handler};
