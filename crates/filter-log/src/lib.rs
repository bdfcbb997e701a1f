//! Per-session filtering decision log.
//!
//! Records why a request, element, or cookie was allowed, blocked, or
//! modified; keeps a bounded per-session history; reconciles its session
//! registry against the host's live tab list; attaches late-arriving rule
//! and action data by correlation id; and broadcasts every change on a
//! synchronous notification bus. Retention is gated behind a
//! reference-counted observer flag so the log does no work while nobody
//! is watching.

pub mod api;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod state;

pub use api::{FilteringLog, SessionProvider};
pub use config::FilterLogConfig;
pub use model::{Notification, NotificationKind, SessionCtx, SessionSummary};
pub use state::FilterLogImpl;
