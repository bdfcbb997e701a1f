use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref LOG_SESSIONS_TOTAL: IntGauge =
        IntGauge::new("filterkit_log_sessions_total", "Tracked sessions").unwrap();
    static ref LOG_EVENTS_RECORDED: IntCounter = IntCounter::new(
        "filterkit_log_events_recorded_total",
        "Filtering events appended to session buffers",
    )
    .unwrap();
    static ref LOG_EVICTIONS: IntCounter = IntCounter::new(
        "filterkit_log_evictions_total",
        "Records evicted from full session buffers",
    )
    .unwrap();
    static ref LOG_ENRICHMENT_MISSES: IntCounter = IntCounter::new(
        "filterkit_log_enrichment_misses_total",
        "Enrichment calls that matched no buffered record",
    )
    .unwrap();
    static ref LOG_GATED_DROPS: IntCounter = IntCounter::new(
        "filterkit_log_gated_drops_total",
        "Record/enrich calls dropped because no observer is active",
    )
    .unwrap();
    static ref LOG_UNKNOWN_SESSION_DROPS: IntCounter = IntCounter::new(
        "filterkit_log_unknown_session_drops_total",
        "Record/enrich calls dropped because the session is unknown",
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register filter log metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, LOG_SESSIONS_TOTAL.clone());
    register(registry, LOG_EVENTS_RECORDED.clone());
    register(registry, LOG_EVICTIONS.clone());
    register(registry, LOG_ENRICHMENT_MISSES.clone());
    register(registry, LOG_GATED_DROPS.clone());
    register(registry, LOG_UNKNOWN_SESSION_DROPS.clone());
}

pub fn set_session_count(count: usize) {
    LOG_SESSIONS_TOTAL.set(count as i64);
}

pub fn record_event_appended() {
    LOG_EVENTS_RECORDED.inc();
}

pub fn record_eviction() {
    LOG_EVICTIONS.inc();
}

pub fn record_enrichment_miss() {
    LOG_ENRICHMENT_MISSES.inc();
}

pub fn record_gated_drop() {
    LOG_GATED_DROPS.inc();
}

pub fn record_unknown_session_drop() {
    LOG_UNKNOWN_SESSION_DROPS.inc();
}
