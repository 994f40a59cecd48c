//! Bidirectional streaming relay between a client and the provider.

pub mod frame;
pub mod policy;
pub mod recorder;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod tests;

pub use frame::{CloseReason, Frame};
pub use policy::{DashboardPolicy, MeteredPolicy, SessionKind, SessionPolicy, TrialPolicy};
pub use recorder::{FinalUsage, UPGRADE_FAILED_MESSAGE, UsageRecorder};
pub use session::{RelaySession, SessionOutcome, Termination};
pub use state::{MeterSnapshot, SessionMeter, SessionState};
pub use transport::{Connection, FrameSink, FrameStream};
