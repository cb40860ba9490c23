//! Metrics registry for network operator observability
//!
//! OpenTelemetry instruments for the reconciliation loop. They are exported
//! only when telemetry was initialized with an OTLP endpoint; otherwise the
//! global no-op meter swallows them.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for network operator metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("netop"));

/// Histogram of reconciliation duration
///
/// Labels:
/// - `controller`: controller name (e.g. ipoibnetwork)
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("netop_reconcile_duration_seconds")
        .with_description("Duration of reconciliation attempts in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconciliation errors
///
/// Labels:
/// - `controller`: controller name
/// - `error_type`: see `Error::kind_label`
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("netop_reconcile_errors_total")
        .with_description("Total number of reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Counter of delayed requeues issued because a resource was not ready
///
/// Labels:
/// - `controller`: controller name
pub static REQUEUES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("netop_requeues_total")
        .with_description("Total number of not-ready requeues")
        .with_unit("{requeues}")
        .build()
});

/// Record the duration of one reconciliation attempt
pub fn record_reconcile(controller: &'static str, seconds: f64, success: bool) {
    let result = if success { "success" } else { "error" };
    RECONCILE_DURATION.record(
        seconds,
        &[
            KeyValue::new("controller", controller),
            KeyValue::new("result", result),
        ],
    );
}

/// Count a reconciliation error
pub fn record_error(controller: &'static str, error_type: &'static str) {
    RECONCILE_ERRORS.add(
        1,
        &[
            KeyValue::new("controller", controller),
            KeyValue::new("error_type", error_type),
        ],
    );
}

/// Count a not-ready requeue
pub fn record_requeue(controller: &'static str) {
    REQUEUES.add(1, &[KeyValue::new("controller", controller)]);
}
