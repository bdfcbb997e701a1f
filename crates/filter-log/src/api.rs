use async_trait::async_trait;

use filterkit_core_types::{EventId, FilterLogError, SessionId};
use filterkit_record::{ActionMask, EngineRule, RequestType};

use crate::model::{SessionCtx, SessionSummary};

/// Host-environment boundary: the authoritative list of live sessions.
///
/// This is the log's only asynchronous dependency; reconciliation sweeps
/// call it and converge the registry on whatever it returns.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn live_sessions(&self) -> Result<Vec<SessionSummary>, FilterLogError>;
}

/// The filtering log surface exposed to the engine, the host lifecycle
/// hooks, and log viewers.
///
/// Recording and enrichment never fail: an unknown session, a stale
/// correlation id, or a closed observer gate make the call a silent no-op.
#[async_trait]
pub trait FilteringLog: Send + Sync {
    /// Converges the registry against the host's live session list and
    /// returns the resulting full list.
    async fn reconcile_sessions(&self) -> Result<Vec<SessionCtx>, FilterLogError>;

    fn create_session(&self, summary: SessionSummary);
    fn update_session(&self, summary: SessionSummary);
    fn remove_session(&self, id: &SessionId);
    fn get_session(&self, id: &SessionId) -> Option<SessionCtx>;

    fn record_request_event(
        &self,
        session: &SessionId,
        url: &str,
        frame_url: &str,
        request_type: RequestType,
        rule: Option<&dyn EngineRule>,
        event_id: EventId,
    );
    fn record_element_event(
        &self,
        session: &SessionId,
        element: &str,
        frame_url: &str,
        request_type: RequestType,
        rule: &dyn EngineRule,
    );
    #[allow(clippy::too_many_arguments)]
    fn record_cookie_event(
        &self,
        session: &SessionId,
        name: &str,
        value: &str,
        domain: &str,
        request_type: RequestType,
        rule: Option<&dyn EngineRule>,
        is_modifying: bool,
        is_third_party: bool,
    );

    fn bind_rule(&self, session: &SessionId, rule: &dyn EngineRule, event_id: &EventId);
    fn bind_replace_rules(&self, session: &SessionId, rules: &[&dyn EngineRule], event_id: &EventId);
    fn bind_applied_actions(&self, session: &SessionId, actions: ActionMask, event_id: &EventId);

    fn reset_session_events(&self, id: &SessionId);

    fn open_observer(&self);
    fn close_observer(&self);
    fn is_observer_active(&self) -> bool;
}
