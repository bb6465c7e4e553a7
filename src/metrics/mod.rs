// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    REQUESTS_TOTAL,
    REQUEST_DURATION,
    GUARD_DECISIONS,
    GUARD_LOOKUP_FAILURES,
    CACHE_OPERATIONS,
    CACHE_ENTRIES,
    FETCH_FALLBACKS,
    WORKER_MESSAGES,
    WORKER_LIFECYCLE,
};

/// Helper to record request metrics
pub fn record_request(method: &str, status_code: u16, route: &str, duration_secs: f64) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status_code.to_string(), route])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[method, &status_code.to_string()])
        .observe(duration_secs);
}

pub fn record_guard_decision(decision: &str) {
    GUARD_DECISIONS.with_label_values(&[decision]).inc();
}

pub fn record_guard_lookup_failure(lookup: &str) {
    GUARD_LOOKUP_FAILURES.with_label_values(&[lookup]).inc();
}

/// Helper to record cache operations (hit, miss, store, store_failed, purge)
pub fn record_cache_operation(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

pub fn update_cache_entries(generation: &str, count: usize) {
    CACHE_ENTRIES.with_label_values(&[generation]).set(count as f64);
}

/// Drop the gauge of a purged generation so its label does not linger.
pub fn remove_cache_entries(generation: &str) {
    // Missing label sets are fine: the generation may never have been counted.
    let _ = CACHE_ENTRIES.remove_label_values(&[generation]);
}

pub fn record_fetch_fallback(kind: &str) {
    FETCH_FALLBACKS.with_label_values(&[kind]).inc();
}

pub fn record_worker_message(message_type: &str) {
    WORKER_MESSAGES.with_label_values(&[message_type]).inc();
}

pub fn record_worker_lifecycle(state: &str) {
    WORKER_LIFECYCLE.with_label_values(&[state]).inc();
}
