//! What differs between metered, trial and dashboard sessions.
//!
//! The forwarding logic is shared; a policy only supplies the deadline,
//! whether usage is persisted, and what to do once the session is final.

use std::fmt;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use super::session::SessionOutcome;
use crate::core::quota::QuotaSnapshot;

pub const SESSION_LIMIT_REASON: &str = "Session time limit reached";
pub const TRIAL_LIMIT_REASON: &str = "Trial session time limit reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Metered,
    Trial,
    Dashboard,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metered => f.write_str("metered"),
            Self::Trial => f.write_str("trial"),
            Self::Dashboard => f.write_str("dashboard"),
        }
    }
}

pub trait SessionPolicy: Send + Sync + fmt::Debug {
    fn kind(&self) -> SessionKind;

    /// Time after which the session is force-closed. `None` for no limit.
    fn compute_deadline(&self) -> Option<Duration>;

    /// Whether a usage record is created and finalized for this session.
    fn should_persist(&self) -> bool;

    /// Close reason sent to the client when the deadline fires.
    fn deadline_reason(&self) -> &'static str {
        SESSION_LIMIT_REASON
    }

    /// Called once, after the usage record (if any) has been finalized.
    fn on_finalize(&self, outcome: &SessionOutcome);
}

/// Billed account key: usage is recorded, no quota applies.
#[derive(Debug, Clone)]
pub struct MeteredPolicy {
    pub key_label: String,
    pub ceiling: Option<Duration>,
}

impl SessionPolicy for MeteredPolicy {
    fn kind(&self) -> SessionKind {
        SessionKind::Metered
    }

    fn compute_deadline(&self) -> Option<Duration> {
        self.ceiling
    }

    fn should_persist(&self) -> bool {
        true
    }

    fn on_finalize(&self, outcome: &SessionOutcome) {
        info!(
            session_id = %outcome.session_id,
            key = %self.key_label,
            status = %outcome.status,
            duration = outcome.duration_seconds.unwrap_or(0.0),
            bytes = outcome.bytes_sent,
            "Metered session finished"
        );
    }
}

/// Trial key: deadline derived from the quota left at authorization time.
#[derive(Debug, Clone)]
pub struct TrialPolicy {
    pub key_label: String,
    pub deadline: Duration,
    pub quota: QuotaSnapshot,
}

impl SessionPolicy for TrialPolicy {
    fn kind(&self) -> SessionKind {
        SessionKind::Trial
    }

    fn compute_deadline(&self) -> Option<Duration> {
        Some(self.deadline)
    }

    fn should_persist(&self) -> bool {
        true
    }

    fn deadline_reason(&self) -> &'static str {
        TRIAL_LIMIT_REASON
    }

    fn on_finalize(&self, outcome: &SessionOutcome) {
        let used = outcome.duration_seconds.unwrap_or(0.0);
        let billed = outcome.status.is_billable();
        info!(
            session_id = %outcome.session_id,
            key = %self.key_label,
            status = %outcome.status,
            duration = used,
            bytes = outcome.bytes_sent,
            remaining_seconds = (self.quota.remaining_duration_seconds - used).max(0.0),
            remaining_sessions = if billed {
                self.quota.remaining_sessions.saturating_sub(1)
            } else {
                self.quota.remaining_sessions
            },
            "Trial session finished"
        );
    }
}

/// Interactive dashboard preview: flat cap, nothing persisted.
#[derive(Debug, Clone)]
pub struct DashboardPolicy {
    pub user_id: Uuid,
    pub ceiling: Duration,
}

impl SessionPolicy for DashboardPolicy {
    fn kind(&self) -> SessionKind {
        SessionKind::Dashboard
    }

    fn compute_deadline(&self) -> Option<Duration> {
        Some(self.ceiling)
    }

    fn should_persist(&self) -> bool {
        false
    }

    fn on_finalize(&self, outcome: &SessionOutcome) {
        info!(
            session_id = %outcome.session_id,
            user_id = %self.user_id,
            termination = ?outcome.termination,
            "Dashboard session finished"
        );
    }
}
