//! Builds and runs one relay session per accepted client connection.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{AuthorizationContext, Identity};
use crate::core::quota::DEFAULT_DASHBOARD_CEILING;
use crate::core::relay::{
    CloseReason, Connection, DashboardPolicy, MeteredPolicy, RelaySession, SessionMeter,
    SessionOutcome, SessionPolicy, SessionState, Termination, TrialPolicy, UPGRADE_FAILED_MESSAGE,
    UsageRecorder,
};
use crate::core::store::UsageStore;
use crate::core::upstream::{TranscriptionParams, UpstreamConnector};

/// Close reason sent to the client when the provider cannot be reached.
pub const UPSTREAM_FAILURE_REASON: &str = "Failed to connect to transcription provider";
/// Close reason sent to the client when its usage record cannot be opened.
pub const SESSION_START_FAILURE_REASON: &str = "Failed to start session";

/// Everything the factory needs to know about an authorized request.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub context: AuthorizationContext,
    pub params: TranscriptionParams,
    pub client_origin: Option<String>,
}

pub struct SessionFactory {
    connector: Arc<dyn UpstreamConnector>,
    usage: Arc<dyn UsageStore>,
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory").finish_non_exhaustive()
    }
}

impl SessionFactory {
    pub fn new(connector: Arc<dyn UpstreamConnector>, usage: Arc<dyn UsageStore>) -> Self {
        Self { connector, usage }
    }

    /// Pick the session policy for an authorization context.
    pub fn policy_for(context: &AuthorizationContext) -> Arc<dyn SessionPolicy> {
        match &context.identity {
            Identity::Metered { .. } => Arc::new(MeteredPolicy {
                key_label: context.identity.log_label(),
                ceiling: context.deadline,
            }),
            // A trial context without a deadline closes immediately
            Identity::Trial { .. } => Arc::new(TrialPolicy {
                key_label: context.identity.log_label(),
                deadline: context.deadline.unwrap_or_default(),
                quota: context.quota.unwrap_or_default(),
            }),
            Identity::Dashboard(user) => Arc::new(DashboardPolicy {
                user_id: user.user_id,
                ceiling: context.deadline.unwrap_or(DEFAULT_DASHBOARD_CEILING),
            }),
        }
    }

    /// Connect upstream, open the usage record, and relay until the session
    /// ends. The returned outcome has already been finalized.
    pub async fn run(&self, client: Connection, request: SessionRequest) -> SessionOutcome {
        let session_id = Uuid::new_v4();
        let policy = Self::policy_for(&request.context);
        let owner = request.context.owner().filter(|_| policy.should_persist());
        let meter = Arc::new(SessionMeter::new());
        let origin = request.client_origin.as_deref();

        info!(
            session_id = %session_id,
            kind = %policy.kind(),
            who = %request.context.identity.log_label(),
            params = request.params.len(),
            "Session accepted, connecting upstream"
        );

        let provider = match self.connector.connect(&request.params).await {
            Ok(provider) => provider,
            Err(e) => {
                error!(session_id = %session_id, "Failed to connect to provider: {}", e);
                let message = format!("upstream connection failed: {e}");

                let mut record_id = None;
                if let Some(owner) = &owner {
                    match UsageRecorder::record_failure(
                        self.usage.as_ref(),
                        owner,
                        &request.params,
                        origin,
                        &message,
                    )
                    .await
                    {
                        Ok(id) => record_id = Some(id),
                        Err(e) => error!(session_id = %session_id, "Failed to record failed session: {}", e),
                    }
                }

                client
                    .sink
                    .close(Some(CloseReason::internal_error(UPSTREAM_FAILURE_REASON)))
                    .await;
                meter.advance(SessionState::Closed);

                let outcome = SessionOutcome::failed(
                    session_id,
                    policy.kind(),
                    Termination::UpstreamUnavailable,
                    record_id,
                    message,
                );
                policy.on_finalize(&outcome);
                return outcome;
            }
        };

        let recorder = match &owner {
            Some(owner) => match UsageRecorder::open(
                self.usage.clone(),
                owner,
                &request.params,
                origin,
                meter.clone(),
            )
            .await
            {
                Ok(recorder) => recorder,
                Err(e) => {
                    error!(session_id = %session_id, "Failed to open usage record: {}", e);
                    client
                        .sink
                        .close(Some(CloseReason::internal_error(
                            SESSION_START_FAILURE_REASON,
                        )))
                        .await;
                    provider.sink.close(None).await;
                    meter.advance(SessionState::Closed);

                    let outcome = SessionOutcome::failed(
                        session_id,
                        policy.kind(),
                        Termination::PersistenceUnavailable,
                        None,
                        e.to_string(),
                    );
                    policy.on_finalize(&outcome);
                    return outcome;
                }
            },
            None => UsageRecorder::detached(meter.clone()),
        };

        RelaySession::new(session_id, policy, recorder)
            .run(client, provider)
            .await
    }

    /// Record a session whose client socket never finished upgrading.
    pub async fn record_upgrade_failure(&self, request: &SessionRequest) -> Option<Uuid> {
        let policy = Self::policy_for(&request.context);
        let owner = request.context.owner().filter(|_| policy.should_persist())?;

        match UsageRecorder::record_failure(
            self.usage.as_ref(),
            &owner,
            &request.params,
            request.client_origin.as_deref(),
            UPGRADE_FAILED_MESSAGE,
        )
        .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to record upgrade failure: {}", e);
                None
            }
        }
    }
}
