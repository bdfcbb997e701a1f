use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use filterkit_core_types::SessionId;
use filterkit_record::FilterEvent;

/// Session metadata as delivered by the host environment, and as carried
/// on session-scoped notifications.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub url: Option<String>,
    #[serde(default)]
    pub is_special: bool,
    #[serde(default)]
    pub is_host_tab_special: bool,
}

impl SessionSummary {
    pub fn new(id: impl Into<SessionId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            is_special: false,
            is_host_tab_special: false,
        }
    }
}

/// A tracked session and its bounded event buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionCtx {
    pub id: SessionId,
    pub title: String,
    pub url: Option<String>,
    pub is_special: bool,
    pub is_host_tab_special: bool,
    pub created_at: DateTime<Utc>,
    pub events: Vec<FilterEvent>,
}

impl SessionCtx {
    pub fn new(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            url: summary.url,
            is_special: summary.is_special,
            is_host_tab_special: summary.is_host_tab_special,
            created_at: Utc::now(),
            events: Vec::new(),
        }
    }

    /// Refreshes metadata in place; the event buffer is untouched.
    pub fn refresh(&mut self, summary: SessionSummary) {
        self.title = summary.title;
        self.url = summary.url;
        self.is_special = summary.is_special;
        self.is_host_tab_special = summary.is_host_tab_special;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            is_special: self.is_special,
            is_host_tab_special: self.is_host_tab_special,
        }
    }
}

/// Named notification kinds subscribers register against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionAdded,
    SessionUpdated,
    SessionRemoved,
    SessionReset,
    EventAdded,
    EventUpdated,
}

/// Change notification published on the bus.
///
/// Session-scoped variants carry metadata only; buffer contents are read
/// through `get_session`, never through a retained reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    SessionAdded {
        session: SessionSummary,
    },
    SessionUpdated {
        session: SessionSummary,
    },
    SessionRemoved {
        id: SessionId,
    },
    SessionReset {
        session: SessionSummary,
    },
    EventAdded {
        session: SessionSummary,
        event: FilterEvent,
    },
    EventUpdated {
        session: SessionSummary,
        event: FilterEvent,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::SessionAdded { .. } => NotificationKind::SessionAdded,
            Notification::SessionUpdated { .. } => NotificationKind::SessionUpdated,
            Notification::SessionRemoved { .. } => NotificationKind::SessionRemoved,
            Notification::SessionReset { .. } => NotificationKind::SessionReset,
            Notification::EventAdded { .. } => NotificationKind::EventAdded,
            Notification::EventUpdated { .. } => NotificationKind::EventUpdated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_keeps_buffer_and_identity() {
        let mut ctx = SessionCtx::new(SessionSummary::new("t1", "Old title"));
        ctx.events.push(filterkit_record::build_request_event(
            filterkit_core_types::EventId::new(),
            "https://example.com/a.js",
            "https://example.com/",
            filterkit_record::RequestType::Script,
            None,
        ));

        let mut updated = SessionSummary::new("t1", "New title");
        updated.url = Some("https://example.com/next".into());
        ctx.refresh(updated);

        assert_eq!(ctx.title, "New title");
        assert_eq!(ctx.url.as_deref(), Some("https://example.com/next"));
        assert_eq!(ctx.events.len(), 1);
    }

    #[test]
    fn notification_kind_matches_variant() {
        let summary = SessionSummary::new("t1", "Tab");
        assert_eq!(
            Notification::SessionAdded {
                session: summary.clone()
            }
            .kind(),
            NotificationKind::SessionAdded
        );
        assert_eq!(
            Notification::SessionRemoved {
                id: summary.id.clone()
            }
            .kind(),
            NotificationKind::SessionRemoved
        );
    }

    #[test]
    fn notification_serializes_with_kind_tag() {
        let summary = SessionSummary::new("t1", "Tab");
        let json = serde_json::to_value(Notification::SessionReset { session: summary }).unwrap();
        assert_eq!(json["kind"], "session_reset");
        assert_eq!(json["session"]["title"], "Tab");
    }
}
