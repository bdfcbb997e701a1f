//! Pure constructors for filtering event records, one per event category.
//!
//! Builders never look sessions up and never publish; the log decides
//! whether a record is retained. All URL/domain derivation is deterministic.

use filterkit_core_types::EventId;

use crate::domain;
use crate::model::{EngineRule, FilterEvent, RequestType, RuleSnapshot};

/// Builds a record for a network request decision.
///
/// `event_id` is the correlation id handed out by the filtering engine; the
/// engine uses it again later to bind the matched rule or applied actions.
/// No rule means "allowed, or classification not yet known".
pub fn build_request_event(
    event_id: EventId,
    url: &str,
    frame_url: &str,
    request_type: RequestType,
    rule: Option<&dyn EngineRule>,
) -> FilterEvent {
    let mut event = FilterEvent::empty(event_id, request_type);
    event.request_url = Some(url.to_string());
    event.request_domain = domain::domain_of(url);
    event.frame_url = Some(frame_url.to_string());
    event.frame_domain = domain::domain_of(frame_url);
    event.is_third_party = domain::is_third_party(url, frame_url);
    event.applied_rule = rule.map(RuleSnapshot::capture);
    event
}

/// Builds a record for a cosmetic/element decision.
///
/// Element events are terminal at creation time, so the correlation id is
/// generated here rather than supplied by the engine.
pub fn build_element_event(
    element: &str,
    frame_url: &str,
    request_type: RequestType,
    rule: &dyn EngineRule,
) -> FilterEvent {
    let mut event = FilterEvent::empty(EventId::new(), request_type);
    event.element_description = Some(element.to_string());
    event.frame_url = Some(frame_url.to_string());
    event.frame_domain = domain::domain_of(frame_url);
    event.request_url = event.frame_url.clone();
    event.request_domain = event.frame_domain.clone();
    event.applied_rule = Some(RuleSnapshot::capture(rule));
    event
}

/// Builds a record for a cookie decision.
///
/// The embedded rule snapshot is always marked cookie-modifying, and the
/// rule's anti-detection actions are copied onto the record when present.
pub fn build_cookie_event(
    name: &str,
    value: &str,
    domain: &str,
    request_type: RequestType,
    rule: Option<&dyn EngineRule>,
    is_modifying: bool,
    is_third_party: bool,
) -> FilterEvent {
    let mut event = FilterEvent::empty(EventId::new(), request_type);
    event.cookie_name = Some(name.to_string());
    event.cookie_value = Some(value.to_string());
    event.request_domain = Some(domain.to_string());
    event.is_modifying_cookie_rule = is_modifying;
    event.is_third_party = is_third_party;
    if let Some(rule) = rule {
        event.applied_rule = Some(RuleSnapshot::capture(rule).mark_cookie_modifying());
        event.applied_actions = rule.applied_actions();
    }
    event
}
