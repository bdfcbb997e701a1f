use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use filterkit_core_types::{EventId, FilterLogError, SessionId};
use filterkit_event_bus::{SubscriberId, SyncBus};
use filterkit_record::{
    build_cookie_event, build_element_event, build_request_event, ActionMask, EngineRule,
    FilterEvent, RequestType, RuleSnapshot,
};

use crate::{
    api::{FilteringLog, SessionProvider},
    config::FilterLogConfig,
    errors::LogError,
    metrics,
    model::{Notification, NotificationKind, SessionCtx, SessionSummary},
};

/// In-memory filtering log: session registry, bounded buffers, enrichment,
/// and the observer gate, publishing every change on a synchronous bus.
pub struct FilterLogImpl {
    cfg: FilterLogConfig,
    sessions: DashMap<SessionId, Arc<RwLock<SessionCtx>>>,
    bus: Arc<SyncBus<NotificationKind, Notification>>,
    observers: Mutex<usize>,
    provider: Option<Arc<dyn SessionProvider>>,
}

impl FilterLogImpl {
    pub fn new(cfg: FilterLogConfig) -> Self {
        Self::build(cfg, None)
    }

    pub fn with_provider(cfg: FilterLogConfig, provider: Arc<dyn SessionProvider>) -> Self {
        Self::build(cfg, Some(provider))
    }

    fn build(cfg: FilterLogConfig, provider: Option<Arc<dyn SessionProvider>>) -> Self {
        let log = Self {
            sessions: DashMap::new(),
            bus: SyncBus::new(),
            observers: Mutex::new(0),
            provider,
            cfg,
        };
        // The background session exists for the whole lifetime of the log
        // and absorbs non-tab-bound traffic.
        let background = SessionSummary {
            id: log.cfg.background_session.clone(),
            title: log.cfg.background_title.clone(),
            url: None,
            is_special: true,
            is_host_tab_special: false,
        };
        log.sessions.insert(
            background.id.clone(),
            Arc::new(RwLock::new(SessionCtx::new(background))),
        );
        metrics::set_session_count(log.sessions.len());
        log
    }

    pub fn subscribe<F>(&self, kind: NotificationKind, handler: F) -> SubscriberId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: NotificationKind, id: SubscriberId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    pub fn session_list(&self) -> Vec<SessionCtx> {
        self.sessions
            .iter()
            .map(|entry| entry.value().read().clone())
            .collect()
    }

    fn session_arc(&self, id: &SessionId) -> Option<Arc<RwLock<SessionCtx>>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn is_background(&self, id: &SessionId) -> bool {
        *id == self.cfg.background_session
    }

    fn publish(&self, notification: Notification) {
        self.bus.publish(notification.kind(), &notification);
    }

    /// Inserts or refreshes one session and fires the matching notification.
    fn upsert(&self, summary: SessionSummary) {
        if let Some(existing) = self.session_arc(&summary.id) {
            let refreshed = {
                let mut guard = existing.write();
                guard.refresh(summary);
                guard.summary()
            };
            self.publish(Notification::SessionUpdated { session: refreshed });
            return;
        }
        let ctx = SessionCtx::new(summary);
        let added = ctx.summary();
        self.sessions
            .insert(ctx.id.clone(), Arc::new(RwLock::new(ctx)));
        metrics::set_session_count(self.sessions.len());
        self.publish(Notification::SessionAdded { session: added });
    }

    fn remove_known_session(&self, id: &SessionId) {
        if self.sessions.remove(id).is_some() {
            metrics::set_session_count(self.sessions.len());
            self.publish(Notification::SessionRemoved { id: id.clone() });
        }
    }

    /// Appends a record to the session's buffer, evicting under overflow.
    ///
    /// Index 0 anchors the session history (the frame's own request) and is
    /// never evicted; overflow removes the second-oldest record instead.
    fn append_event(&self, session: &SessionId, event: FilterEvent) {
        if !self.is_observer_active() {
            metrics::record_gated_drop();
            return;
        }
        let Some(ctx) = self.session_arc(session) else {
            metrics::record_unknown_session_drop();
            debug!(session = %session, "dropping event for unknown session");
            return;
        };
        let summary = {
            let mut guard = ctx.write();
            guard.events.push(event.clone());
            if guard.events.len() > self.cfg.event_capacity {
                guard.events.remove(1);
                metrics::record_eviction();
            }
            guard.summary()
        };
        metrics::record_event_appended();
        self.publish(Notification::EventAdded { session: summary, event });
    }

    /// Locates a buffered record by correlation id and mutates it in place.
    ///
    /// The scan runs newest to oldest and stops at the first match; a stale
    /// id is a silent no-op, surfaced only on the miss counter.
    fn enrich(&self, session: &SessionId, event_id: &EventId, mutate: impl FnOnce(&mut FilterEvent)) {
        if !self.is_observer_active() {
            metrics::record_gated_drop();
            return;
        }
        let Some(ctx) = self.session_arc(session) else {
            metrics::record_unknown_session_drop();
            debug!(session = %session, "dropping enrichment for unknown session");
            return;
        };
        let enriched = {
            let mut guard = ctx.write();
            let found = guard
                .events
                .iter_mut()
                .rev()
                .find(|event| &event.event_id == event_id)
                .map(|event| {
                    mutate(event);
                    event.clone()
                });
            found.map(|event| (guard.summary(), event))
        };
        match enriched {
            Some((summary, event)) => {
                self.publish(Notification::EventUpdated { session: summary, event });
            }
            None => {
                metrics::record_enrichment_miss();
                debug!(session = %session, event = %event_id, "enrichment matched no record");
            }
        }
    }
}

#[async_trait]
impl FilteringLog for FilterLogImpl {
    async fn reconcile_sessions(&self) -> Result<Vec<SessionCtx>, FilterLogError> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| LogError::NoProvider.into_filter_log_error("reconcile_sessions"))?;
        let live = provider
            .live_sessions()
            .await
            .map_err(|err| LogError::Provider.into_filter_log_error(err.to_string()))?;

        let mut live_ids: HashSet<SessionId> = HashSet::with_capacity(live.len());
        for summary in live {
            if self.is_background(&summary.id) {
                continue;
            }
            live_ids.insert(summary.id.clone());
            self.upsert(summary);
        }

        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !self.is_background(id) && !live_ids.contains(id))
            .collect();
        for id in stale {
            self.remove_known_session(&id);
        }

        Ok(self.session_list())
    }

    fn create_session(&self, summary: SessionSummary) {
        if self.is_background(&summary.id) {
            return;
        }
        self.upsert(summary);
    }

    fn update_session(&self, summary: SessionSummary) {
        if self.is_background(&summary.id) {
            return;
        }
        // An update for a session we have not seen yet behaves as a create;
        // the host's individual notifications can race a reconcile sweep and
        // later writes win either way.
        self.upsert(summary);
    }

    fn remove_session(&self, id: &SessionId) {
        if self.is_background(id) {
            return;
        }
        self.remove_known_session(id);
    }

    fn get_session(&self, id: &SessionId) -> Option<SessionCtx> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().read().clone())
    }

    fn record_request_event(
        &self,
        session: &SessionId,
        url: &str,
        frame_url: &str,
        request_type: RequestType,
        rule: Option<&dyn EngineRule>,
        event_id: EventId,
    ) {
        let event = build_request_event(event_id, url, frame_url, request_type, rule);
        self.append_event(session, event);
    }

    fn record_element_event(
        &self,
        session: &SessionId,
        element: &str,
        frame_url: &str,
        request_type: RequestType,
        rule: &dyn EngineRule,
    ) {
        let event = build_element_event(element, frame_url, request_type, rule);
        self.append_event(session, event);
    }

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
    ) {
        let event = build_cookie_event(
            name,
            value,
            domain,
            request_type,
            rule,
            is_modifying,
            is_third_party,
        );
        self.append_event(session, event);
    }

    fn bind_rule(&self, session: &SessionId, rule: &dyn EngineRule, event_id: &EventId) {
        let snapshot = RuleSnapshot::capture(rule);
        self.enrich(session, event_id, move |event| {
            event.applied_rule = Some(snapshot);
        });
    }

    fn bind_replace_rules(
        &self,
        session: &SessionId,
        rules: &[&dyn EngineRule],
        event_id: &EventId,
    ) {
        let snapshots: Vec<RuleSnapshot> = rules
            .iter()
            .map(|rule| RuleSnapshot::capture(*rule))
            .collect();
        self.enrich(session, event_id, move |event| {
            event.replace_rules = Some(snapshots);
        });
    }

    fn bind_applied_actions(&self, session: &SessionId, actions: ActionMask, event_id: &EventId) {
        self.enrich(session, event_id, move |event| {
            event.applied_actions = Some(actions);
        });
    }

    fn reset_session_events(&self, id: &SessionId) {
        let Some(ctx) = self.session_arc(id) else {
            return;
        };
        let summary = {
            let mut guard = ctx.write();
            guard.events.clear();
            guard.summary()
        };
        self.publish(Notification::SessionReset { session: summary });
    }

    fn open_observer(&self) {
        let mut count = self.observers.lock();
        *count += 1;
    }

    fn close_observer(&self) {
        let mut count = self.observers.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count > 0 {
            return;
        }
        // Last observer gone: drop every buffer while still holding the
        // gate so the decrement and the clearing are one atomic unit.
        let mut reset: Vec<SessionSummary> = Vec::with_capacity(self.sessions.len());
        for entry in self.sessions.iter() {
            let mut guard = entry.value().write();
            guard.events.clear();
            reset.push(guard.summary());
        }
        drop(count);
        for session in reset {
            self.publish(Notification::SessionReset { session });
        }
    }

    fn is_observer_active(&self) -> bool {
        *self.observers.lock() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filterkit_record::RuleKind;

    struct StubRule {
        id: i64,
        text: String,
        kind: RuleKind,
    }

    impl StubRule {
        fn network(id: i64, text: &str) -> Self {
            Self {
                id,
                text: text.to_string(),
                kind: RuleKind::network(),
            }
        }
    }

    impl EngineRule for StubRule {
        fn filter_id(&self) -> i64 {
            self.id
        }
        fn text(&self) -> &str {
            &self.text
        }
        fn kind(&self) -> RuleKind {
            self.kind.clone()
        }
    }

    fn open_log() -> FilterLogImpl {
        let log = FilterLogImpl::new(FilterLogConfig::default());
        log.create_session(SessionSummary::new("t1", "Tab one"));
        log.open_observer();
        log
    }

    fn record_simple(log: &FilterLogImpl, session: &SessionId, event_id: &str) {
        log.record_request_event(
            session,
            "https://cdn.example.com/app.js",
            "https://example.com/",
            RequestType::Script,
            None,
            EventId::from(event_id),
        );
    }

    #[test]
    fn background_session_exists_and_resists_lifecycle_ops() {
        let log = FilterLogImpl::new(FilterLogConfig::default());
        let background = SessionId::from("background");

        assert!(log.get_session(&background).is_some());

        log.remove_session(&background);
        assert!(log.get_session(&background).is_some());

        let mut renamed = SessionSummary::new("background", "Hijacked");
        renamed.url = Some("https://example.com".into());
        log.update_session(renamed);
        assert_eq!(log.get_session(&background).unwrap().title, "Background");
    }

    #[test]
    fn recording_is_gated_until_an_observer_opens() {
        let log = FilterLogImpl::new(FilterLogConfig::default());
        log.create_session(SessionSummary::new("t1", "Tab"));
        let session = SessionId::from("t1");

        record_simple(&log, &session, "e-1");
        assert!(log.get_session(&session).unwrap().events.is_empty());

        log.open_observer();
        record_simple(&log, &session, "e-2");
        assert_eq!(log.get_session(&session).unwrap().events.len(), 1);
    }

    #[test]
    fn unknown_session_is_a_silent_no_op() {
        let log = open_log();
        record_simple(&log, &SessionId::from("ghost"), "e-1");
        assert!(log.get_session(&SessionId::from("ghost")).is_none());
    }

    #[test]
    fn overflow_evicts_second_oldest_never_the_anchor() {
        let cfg = FilterLogConfig {
            event_capacity: 5,
            ..FilterLogConfig::default()
        };
        let log = FilterLogImpl::new(cfg);
        log.create_session(SessionSummary::new("t1", "Tab"));
        log.open_observer();
        let session = SessionId::from("t1");

        for i in 0..8 {
            record_simple(&log, &session, &format!("e-{i}"));
        }

        let events = log.get_session(&session).unwrap().events;
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].event_id, EventId::from("e-0"));
        assert_eq!(events[1].event_id, EventId::from("e-4"));
        assert_eq!(events[4].event_id, EventId::from("e-7"));
    }

    #[test]
    fn capacity_bound_holds_under_sustained_appends() {
        let log = open_log();
        let session = SessionId::from("t1");
        for i in 0..1_001 {
            record_simple(&log, &session, &format!("e-{i}"));
        }
        let events = log.get_session(&session).unwrap().events;
        assert_eq!(events.len(), 1_000);
        assert_eq!(events[0].event_id, EventId::from("e-0"));
    }

    #[test]
    fn bind_rule_attaches_snapshot_to_previously_bare_record() {
        let log = open_log();
        let session = SessionId::from("t1");
        record_simple(&log, &session, "e-1");
        assert!(log.get_session(&session).unwrap().events[0]
            .applied_rule
            .is_none());

        let rule = StubRule::network(7, "||cdn.example.com^");
        log.bind_rule(&session, &rule, &EventId::from("e-1"));

        let snapshot = log.get_session(&session).unwrap().events[0]
            .applied_rule
            .clone()
            .expect("snapshot bound");
        assert_eq!(snapshot.filter_id, 7);
        assert_eq!(snapshot.rule_text, "||cdn.example.com^");
    }

    #[test]
    fn enrichment_scans_newest_first_and_stops_at_first_match() {
        let log = open_log();
        let session = SessionId::from("t1");
        // Duplicate correlation ids should not happen, but when they do the
        // most recently appended record wins, deterministically.
        record_simple(&log, &session, "dup");
        record_simple(&log, &session, "dup");

        let rule = StubRule::network(1, "||ads.example^");
        log.bind_rule(&session, &rule, &EventId::from("dup"));

        let events = log.get_session(&session).unwrap().events;
        assert!(events[0].applied_rule.is_none());
        assert!(events[1].applied_rule.is_some());
    }

    #[test]
    fn enrichment_miss_is_silent() {
        let log = open_log();
        let session = SessionId::from("t1");
        record_simple(&log, &session, "e-1");

        let rule = StubRule::network(1, "||ads.example^");
        log.bind_rule(&session, &rule, &EventId::from("stale"));

        assert!(log.get_session(&session).unwrap().events[0]
            .applied_rule
            .is_none());
    }

    #[test]
    fn bind_replace_rules_attaches_the_whole_list() {
        let log = open_log();
        let session = SessionId::from("t1");
        record_simple(&log, &session, "e-1");

        let first = StubRule::network(1, "||a.example^$replace=/x/y/");
        let second = StubRule::network(2, "||a.example^$replace=/y/z/");
        log.bind_replace_rules(&session, &[&first, &second], &EventId::from("e-1"));

        let replace = log.get_session(&session).unwrap().events[0]
            .replace_rules
            .clone()
            .expect("replace rules bound");
        assert_eq!(replace.len(), 2);
        assert_eq!(replace[1].filter_id, 2);
    }

    #[test]
    fn bind_applied_actions_is_independent_of_rule_binding() {
        let log = open_log();
        let session = SessionId::from("t1");
        record_simple(&log, &session, "e-1");

        log.bind_applied_actions(
            &session,
            ActionMask::HIDE_REFERRER | ActionMask::BLOCK_WEBRTC,
            &EventId::from("e-1"),
        );

        let event = &log.get_session(&session).unwrap().events[0];
        assert!(event.applied_rule.is_none());
        assert_eq!(
            event.applied_actions,
            Some(ActionMask::HIDE_REFERRER | ActionMask::BLOCK_WEBRTC)
        );
    }

    #[test]
    fn observer_count_saturates_at_zero() {
        let log = FilterLogImpl::new(FilterLogConfig::default());
        log.open_observer();
        log.close_observer();
        log.close_observer();
        log.close_observer();
        assert!(!log.is_observer_active());

        log.open_observer();
        assert!(log.is_observer_active());
    }

    #[test]
    fn closing_last_observer_clears_buffers_and_keeps_metadata() {
        let log = open_log();
        log.open_observer();
        let session = SessionId::from("t1");
        record_simple(&log, &session, "e-1");

        log.close_observer();
        assert!(log.is_observer_active());
        assert_eq!(log.get_session(&session).unwrap().events.len(), 1);

        log.close_observer();
        let ctx = log.get_session(&session).expect("metadata survives");
        assert_eq!(ctx.title, "Tab one");
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn reset_clears_one_session_and_notifies() {
        let log = open_log();
        let session = SessionId::from("t1");
        record_simple(&log, &session, "e-1");

        let resets = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&resets);
        log.subscribe(NotificationKind::SessionReset, move |_| {
            *seen.lock() += 1;
        });

        log.reset_session_events(&session);
        assert!(log.get_session(&session).unwrap().events.is_empty());
        assert_eq!(*resets.lock(), 1);

        log.reset_session_events(&SessionId::from("ghost"));
        assert_eq!(*resets.lock(), 1);
    }
}
