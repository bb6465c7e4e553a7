// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, HistogramVec, GaugeVec, Opts, Registry, TextEncoder, Encoder,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_gauge_vec_with_registry,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REQUEST METRICS
    // ============================================================================

    /// Total number of proxied requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("requests_total", "Total number of proxied requests"),
        &["method", "status_code", "route"], // route: proxy, redirect
        REGISTRY
    ).unwrap();

    /// Request duration histogram
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("request_duration_seconds", "Request duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "status_code"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // GUARD METRICS
    // ============================================================================

    /// Route guard outcomes
    pub static ref GUARD_DECISIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("guard_decisions_total", "Total route guard decisions"),
        &["decision"],
        REGISTRY
    ).unwrap();

    /// Failed session / two-factor lookups
    pub static ref GUARD_LOOKUP_FAILURES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("guard_lookup_failures_total", "Failed auth backend lookups"),
        &["lookup"], // lookup: session, two_factor
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total cache operations"),
        &["operation"], // operation: hit, miss, store, store_failed, purge
        REGISTRY
    ).unwrap();

    /// Current cache entries per generation
    pub static ref CACHE_ENTRIES: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("cache_entries_current", "Current number of cache entries"),
        &["generation"],
        REGISTRY
    ).unwrap();

    /// Offline fallbacks served
    pub static ref FETCH_FALLBACKS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("fetch_fallbacks_total", "Responses served without the network"),
        &["kind"], // kind: offline_page, unavailable
        REGISTRY
    ).unwrap();

    // ============================================================================
    // WORKER METRICS
    // ============================================================================

    /// Messages delivered to clients
    pub static ref WORKER_MESSAGES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("worker_messages_total", "Messages delivered to dashboard clients"),
        &["type"],
        REGISTRY
    ).unwrap();

    /// Worker lifecycle transitions
    pub static ref WORKER_LIFECYCLE: CounterVec = register_counter_vec_with_registry!(
        Opts::new("worker_lifecycle_total", "Worker state transitions"),
        &["state"],
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Vec collectors only show up once a label set has been touched
        GUARD_DECISIONS.with_label_values(&["allow"]).inc();
        CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
        let metrics = gather_metrics();
        assert!(metrics.contains("guard_decisions_total"));
        assert!(metrics.contains("cache_operations_total"));
    }
}
