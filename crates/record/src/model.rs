use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use filterkit_core_types::EventId;

/// Category of the request or element a filtering decision applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Document,
    Subdocument,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    XmlHttpRequest,
    WebSocket,
    Cookie,
    Element,
    Other,
}

bitflags! {
    /// Anti-detection actions applied alongside a rule decision.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ActionMask: u32 {
        const HIDE_REFERRER = 0b0000_0001;
        const HIDE_SEARCH_QUERIES = 0b0000_0010;
        const BLOCK_WEBRTC = 0b0000_0100;
        const REMOVE_CLIENT_DATA = 0b0000_1000;
        const FIRST_PARTY_COOKIES = 0b0001_0000;
        const THIRD_PARTY_COOKIES = 0b0010_0000;
    }
}

impl Default for ActionMask {
    fn default() -> Self {
        ActionMask::empty()
    }
}

/// Variant-specific facts of a matched rule, decided at snapshot time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Content,
    Style,
    Network {
        is_exception: bool,
        is_csp: bool,
        csp_directive: Option<String>,
        is_cookie_modifying: bool,
    },
}

impl RuleKind {
    pub fn network() -> Self {
        RuleKind::Network {
            is_exception: false,
            is_csp: false,
            csp_directive: None,
            is_cookie_modifying: false,
        }
    }
}

/// Engine-decoupled copy of a matched rule's display/audit fields.
///
/// Snapshots never hold a reference to the live rule: the engine may reload
/// or drop its rule set independently of the log's retention.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub filter_id: i64,
    pub rule_text: String,
    pub kind: RuleKind,
}

impl RuleSnapshot {
    /// Copies the enumerated fields out of a live engine rule.
    pub fn capture(rule: &dyn EngineRule) -> Self {
        Self {
            filter_id: rule.filter_id(),
            rule_text: rule.text().to_string(),
            kind: rule.kind(),
        }
    }

    /// Forces the cookie-modifying flag on network snapshots; cookie events
    /// always mark their embedded rule this way.
    pub fn mark_cookie_modifying(mut self) -> Self {
        if let RuleKind::Network {
            ref mut is_cookie_modifying,
            ..
        } = self.kind
        {
            *is_cookie_modifying = true;
        }
        self
    }
}

/// Seam between the filtering engine's rule objects and the log.
///
/// The log only ever reads through this trait at snapshot-construction time.
pub trait EngineRule: Send + Sync {
    fn filter_id(&self) -> i64;
    fn text(&self) -> &str;
    fn kind(&self) -> RuleKind;
    fn applied_actions(&self) -> Option<ActionMask> {
        None
    }
}

/// One recorded filtering decision inside a session's buffer.
///
/// Append-only once created; enrichment mutates it in place through the log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterEvent {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub request_url: Option<String>,
    pub request_domain: Option<String>,
    pub frame_url: Option<String>,
    pub frame_domain: Option<String>,
    pub request_type: RequestType,
    pub is_third_party: bool,
    pub element_description: Option<String>,
    pub cookie_name: Option<String>,
    pub cookie_value: Option<String>,
    pub is_modifying_cookie_rule: bool,
    pub applied_rule: Option<RuleSnapshot>,
    pub replace_rules: Option<Vec<RuleSnapshot>>,
    #[serde(with = "action_mask_bits")]
    pub applied_actions: Option<ActionMask>,
}

/// Serializes the action mask as its raw bits; flag names are a display
/// concern, the log only guarantees the bit pattern round-trips.
mod action_mask_bits {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::ActionMask;

    pub fn serialize<S>(mask: &Option<ActionMask>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        mask.map(|m| m.bits()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<ActionMask>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = Option::<u32>::deserialize(deserializer)?;
        Ok(bits.map(ActionMask::from_bits_truncate))
    }
}

impl FilterEvent {
    pub(crate) fn empty(event_id: EventId, request_type: RequestType) -> Self {
        Self {
            event_id,
            timestamp: Utc::now(),
            request_url: None,
            request_domain: None,
            frame_url: None,
            frame_domain: None,
            request_type,
            is_third_party: false,
            element_description: None,
            cookie_name: None,
            cookie_value: None,
            is_modifying_cookie_rule: false,
            applied_rule: None,
            replace_rules: None,
            applied_actions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRule {
        kind: RuleKind,
    }

    impl EngineRule for StubRule {
        fn filter_id(&self) -> i64 {
            12
        }
        fn text(&self) -> &str {
            "||tracker.example^"
        }
        fn kind(&self) -> RuleKind {
            self.kind.clone()
        }
    }

    #[test]
    fn capture_copies_fields_without_aliasing() {
        let rule = StubRule {
            kind: RuleKind::network(),
        };
        let snapshot = RuleSnapshot::capture(&rule);
        drop(rule);

        assert_eq!(snapshot.filter_id, 12);
        assert_eq!(snapshot.rule_text, "||tracker.example^");
        assert_eq!(snapshot.kind, RuleKind::network());
    }

    #[test]
    fn mark_cookie_modifying_only_touches_network_variants() {
        let network = RuleSnapshot {
            filter_id: 1,
            rule_text: "$cookie=tracker".into(),
            kind: RuleKind::network(),
        }
        .mark_cookie_modifying();
        match network.kind {
            RuleKind::Network {
                is_cookie_modifying,
                ..
            } => assert!(is_cookie_modifying),
            _ => panic!("expected network kind"),
        }

        let style = RuleSnapshot {
            filter_id: 1,
            rule_text: "#$#body { display: none }".into(),
            kind: RuleKind::Style,
        }
        .mark_cookie_modifying();
        assert_eq!(style.kind, RuleKind::Style);
    }

    #[test]
    fn action_mask_round_trips_as_bits() {
        let mut event = FilterEvent::empty(EventId::from("e-1"), RequestType::Cookie);
        event.applied_actions = Some(ActionMask::BLOCK_WEBRTC | ActionMask::HIDE_REFERRER);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json["applied_actions"],
            (ActionMask::BLOCK_WEBRTC | ActionMask::HIDE_REFERRER).bits()
        );

        let back: FilterEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.applied_actions, event.applied_actions);
    }

    #[test]
    fn rule_kind_serializes_tagged() {
        let json = serde_json::to_value(RuleKind::network()).unwrap();
        assert_eq!(json["type"], "network");
        assert_eq!(json["is_exception"], false);
    }
}
