//! Prometheus metrics for veto-engine.
//!
//! Tracks evaluation outcomes, rule matches, action failures and the size
//! of the rule registry.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Evaluations by final outcome
    pub static ref EVALUATIONS_TOTAL: CounterVec = register_counter_vec!(
        "veto_evaluations_total",
        "Total number of request evaluations",
        &["stage", "outcome"]  // outcome: cancelled|redirected|modified|passthrough|timeout
    )
    .expect("metric can be registered");

    /// Rules whose conditions matched and whose actions ran
    pub static ref RULE_MATCHES_TOTAL: CounterVec = register_counter_vec!(
        "veto_rule_matches_total",
        "Total number of rule matches",
        &["registrant"]
    )
    .expect("metric can be registered");

    /// Rules skipped because their registrant was no longer active
    pub static ref RULES_SKIPPED_TOTAL: CounterVec = register_counter_vec!(
        "veto_rules_skipped_total",
        "Total number of matched rules skipped for inactive registrants",
        &["registrant"]
    )
    .expect("metric can be registered");

    /// Swallowed action failures
    pub static ref ACTION_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "veto_action_failures_total",
        "Total number of actions that failed and were treated as no-ops",
        &["action", "kind"]  // kind: timeout|registrant_unavailable|callback|malformed_result
    )
    .expect("metric can be registered");

    /// Wall time of one evaluation
    pub static ref EVALUATION_DURATION_MS: HistogramVec = register_histogram_vec!(
        "veto_evaluation_duration_ms",
        "Histogram of request evaluation time in milliseconds",
        &["stage"],
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .expect("metric can be registered");

    /// Rules currently registered
    pub static ref REGISTERED_RULES: IntGauge = register_int_gauge!(
        "veto_registered_rules",
        "Number of rules currently registered"
    )
    .expect("metric can be registered");
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a finished evaluation
pub fn record_evaluation(stage: &str, outcome: &str, duration_ms: f64) {
    EVALUATIONS_TOTAL.with_label_values(&[stage, outcome]).inc();
    EVALUATION_DURATION_MS
        .with_label_values(&[stage])
        .observe(duration_ms);
}

pub fn record_rule_match(registrant: &str) {
    RULE_MATCHES_TOTAL.with_label_values(&[registrant]).inc();
}

pub fn record_rule_skipped(registrant: &str) {
    RULES_SKIPPED_TOTAL.with_label_values(&[registrant]).inc();
}

pub fn record_action_failure(action: &str, kind: &str) {
    ACTION_FAILURES_TOTAL
        .with_label_values(&[action, kind])
        .inc();
}

pub fn set_registered_rules(count: usize) {
    REGISTERED_RULES.set(count as i64);
}
