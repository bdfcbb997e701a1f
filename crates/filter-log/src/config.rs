use serde::{Deserialize, Serialize};

use filterkit_core_types::SessionId;

/// Capacity and identity knobs for the filtering log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterLogConfig {
    /// Per-session buffer capacity. Overflow evicts the second-oldest
    /// record; the first record anchors the session history and stays.
    pub event_capacity: usize,
    /// Reserved session id for non-tab-bound traffic. Created once at
    /// construction, exempt from create/update/remove and reconciliation.
    pub background_session: SessionId,
    /// Title assigned to the background session.
    pub background_title: String,
}

impl Default for FilterLogConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1_000,
            background_session: SessionId::from("background"),
            background_title: "Background".into(),
        }
    }
}
