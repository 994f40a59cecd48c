pub mod factory;
pub mod quota;
pub mod relay;
pub mod store;
pub mod upstream;

pub use factory::{SessionFactory, SessionRequest};
pub use quota::{QuotaPolicy, QuotaSnapshot, TrialDecision};
pub use relay::{RelaySession, SessionKind, SessionOutcome, Termination};
pub use store::{CredentialStore, MemoryStore, UsageStore};
pub use upstream::{DeepgramConnector, TranscriptionParams, UpstreamConnector, UpstreamError};
