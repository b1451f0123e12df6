//! Metric descriptions for budgetwatch.
//!
//! Counters are emitted through the `metrics` facade. The process runs once
//! per event, so no exporter is started here; a host that installs a
//! recorder (push gateway, statsd, ...) gets the counters for free.

use metrics::{counter, describe_counter};

/// Every counter emitted by the crate.
pub const COUNTER_NAMES: &[&str] = &[
    "budgetwatch_events_total",
    "budgetwatch_events_malformed_total",
    "budgetwatch_notifications_sent_total",
    "budgetwatch_notifications_skipped_total",
    "budgetwatch_notify_errors_total",
    "budgetwatch_state_errors_total",
    "budgetwatch_commit_failures_total",
];

/// Register all metric descriptions.
///
/// Call once after a recorder is installed.
pub fn register_metric_descriptions() {
    describe_counter!(
        "budgetwatch_events_total",
        "Total number of budget alert events received"
    );
    describe_counter!(
        "budgetwatch_events_malformed_total",
        "Total number of events rejected as malformed (never retried)"
    );
    describe_counter!(
        "budgetwatch_notifications_sent_total",
        "Total number of notifications delivered to the chat API"
    );
    describe_counter!(
        "budgetwatch_notifications_skipped_total",
        "Total number of events suppressed because the threshold was already announced"
    );
    describe_counter!(
        "budgetwatch_notify_errors_total",
        "Total number of notifications that failed permanently or after all retries"
    );
    describe_counter!(
        "budgetwatch_state_errors_total",
        "Total number of state store failures, by operation (get/set)"
    );
    describe_counter!(
        "budgetwatch_commit_failures_total",
        "Total number of notifications sent whose watermark could not be stored"
    );
}

/// Initialize counters to zero so they are visible before the first event.
pub fn initialize_metrics(notifier_type: &'static str) {
    counter!("budgetwatch_events_total").absolute(0);
    counter!("budgetwatch_events_malformed_total").absolute(0);
    counter!("budgetwatch_notifications_skipped_total").absolute(0);
    counter!("budgetwatch_commit_failures_total").absolute(0);
    counter!("budgetwatch_notifications_sent_total", "notifier_type" => notifier_type).absolute(0);
    for kind in ["permanent", "exhausted"] {
        counter!(
            "budgetwatch_notify_errors_total",
            "notifier_type" => notifier_type,
            "kind" => kind
        )
        .absolute(0);
    }
    for operation in ["get", "set"] {
        counter!("budgetwatch_state_errors_total", "operation" => operation).absolute(0);
    }

    tracing::debug!(notifier_type, "Metrics initialized to zero");
}
