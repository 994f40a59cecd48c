pub mod context;
pub mod credential;
pub mod dashboard;
pub mod extractor;
pub mod origin;
pub mod resolver;

// Re-export commonly used items
pub use context::{AuthorizationContext, DashboardUser, Identity};
pub use credential::{display_prefix, hash_credential, is_credential_digest};
pub use dashboard::{DashboardClaims, DashboardTokenVerifier};
pub use extractor::{ClientOrigin, extract_api_key, extract_dashboard_token};
pub use origin::OriginPolicy;
pub use resolver::{CredentialResolver, TrialStatus, TrialUsage};
