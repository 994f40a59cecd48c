//! Allowance and deadline computation.
//!
//! Pure arithmetic over configured ceilings, trial limits and aggregate usage.
//! Callers load the aggregate fresh for every new session; nothing here is
//! cached.

use std::time::Duration;

use serde::Serialize;

use crate::core::store::{TrialLimits, UsageAggregate};

/// Cap on an interactive dashboard session unless configured otherwise.
pub const DEFAULT_DASHBOARD_CEILING: Duration = Duration::from_secs(300);

/// Remaining trial allowance at authorization time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub used_duration_seconds: f64,
    pub used_sessions: u64,
    pub remaining_duration_seconds: f64,
    pub remaining_sessions: u64,
}

impl QuotaSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining_duration_seconds <= 0.0 || self.remaining_sessions == 0
    }
}

/// Outcome of evaluating a trial credential against its limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialDecision {
    Admit {
        snapshot: QuotaSnapshot,
        deadline: Duration,
    },
    Exhausted(QuotaSnapshot),
}

/// Session ceilings for the credential classes that carry no quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    metered_ceiling: Option<Duration>,
    dashboard_ceiling: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            metered_ceiling: None,
            dashboard_ceiling: DEFAULT_DASHBOARD_CEILING,
        }
    }
}

impl QuotaPolicy {
    pub fn new(metered_ceiling: Option<Duration>, dashboard_ceiling: Duration) -> Self {
        Self {
            metered_ceiling,
            dashboard_ceiling,
        }
    }

    /// Deadline for a metered session. `None` means unrestricted.
    pub fn metered(&self) -> Option<Duration> {
        self.metered_ceiling
    }

    /// Flat cap for an interactive dashboard session.
    pub fn dashboard(&self) -> Duration {
        self.dashboard_ceiling
    }

    /// Remaining allowance, clamped at zero.
    pub fn remaining(limits: &TrialLimits, usage: &UsageAggregate) -> QuotaSnapshot {
        let used_duration = usage.total_duration_seconds.max(0.0);
        QuotaSnapshot {
            used_duration_seconds: used_duration,
            used_sessions: usage.sessions,
            remaining_duration_seconds: (limits.max_duration_seconds as f64 - used_duration)
                .max(0.0),
            remaining_sessions: limits.max_sessions.saturating_sub(usage.sessions),
        }
    }

    /// Admit or reject a trial session. An admitted session's deadline is the
    /// smaller of the per-session cap and the remaining cumulative duration.
    pub fn trial(limits: &TrialLimits, usage: &UsageAggregate) -> TrialDecision {
        let snapshot = Self::remaining(limits, usage);
        if snapshot.is_exhausted() {
            return TrialDecision::Exhausted(snapshot);
        }

        let per_session = limits.max_session_duration_seconds as f64;
        let seconds = per_session.min(snapshot.remaining_duration_seconds);
        let deadline = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        TrialDecision::Admit { snapshot, deadline }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> TrialLimits {
        TrialLimits {
            max_duration_seconds: 1800,
            max_sessions: 20,
            max_session_duration_seconds: 300,
            expiry_days: 90,
        }
    }

    fn usage(sessions: u64, seconds: f64) -> UsageAggregate {
        UsageAggregate {
            sessions,
            total_duration_seconds: seconds,
        }
    }

    #[test]
    fn fresh_trial_gets_per_session_cap() {
        match QuotaPolicy::trial(&limits(), &usage(0, 0.0)) {
            TrialDecision::Admit { snapshot, deadline } => {
                assert_eq!(deadline, Duration::from_secs(300));
                assert_eq!(snapshot.remaining_sessions, 20);
                assert_eq!(snapshot.remaining_duration_seconds, 1800.0);
            }
            other => panic!("expected admit, got {other:?}"),
        }
    }

    #[test]
    fn deadline_shrinks_to_remaining_duration() {
        match QuotaPolicy::trial(&limits(), &usage(7, 1795.0)) {
            TrialDecision::Admit { snapshot, deadline } => {
                assert_eq!(deadline, Duration::from_secs(5));
                assert_eq!(snapshot.remaining_sessions, 13);
            }
            other => panic!("expected admit, got {other:?}"),
        }

        match QuotaPolicy::trial(&limits(), &usage(1, 1799.5)) {
            TrialDecision::Admit { deadline, .. } => {
                assert_eq!(deadline, Duration::from_millis(500));
            }
            other => panic!("expected admit, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_duration_rejects() {
        let decision = QuotaPolicy::trial(&limits(), &usage(3, 1800.0));
        assert!(matches!(decision, TrialDecision::Exhausted(s) if s.remaining_duration_seconds == 0.0));

        // overshoot clamps to zero rather than going negative
        let snapshot = QuotaPolicy::remaining(&limits(), &usage(3, 2400.0));
        assert_eq!(snapshot.remaining_duration_seconds, 0.0);
    }

    #[test]
    fn exhausted_sessions_rejects() {
        let decision = QuotaPolicy::trial(&limits(), &usage(20, 10.0));
        assert!(matches!(decision, TrialDecision::Exhausted(s) if s.remaining_sessions == 0));

        let snapshot = QuotaPolicy::remaining(&limits(), &usage(25, 0.0));
        assert_eq!(snapshot.remaining_sessions, 0);
    }

    #[test]
    fn ceilings_for_unquoted_classes() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.metered(), None);
        assert_eq!(policy.dashboard(), Duration::from_secs(300));

        let policy = QuotaPolicy::new(Some(Duration::from_secs(3600)), Duration::from_secs(60));
        assert_eq!(policy.metered(), Some(Duration::from_secs(3600)));
        assert_eq!(policy.dashboard(), Duration::from_secs(60));
    }
}
