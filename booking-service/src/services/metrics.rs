use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static BOOKING_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PROCESSOR_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PARTICIPANT_MOVE_SIZE: OnceLock<HistogramVec> = OnceLock::new();

/// Install the Prometheus recorder and register the custom booking
/// metrics. Safe to call more than once; later calls are no-ops so test
/// harnesses can initialize freely.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    let builder = PrometheusBuilder::new();
    let handle = match builder.install_recorder() {
        Ok(handle) => handle,
        Err(_) => return,
    };

    if METRICS_HANDLE.set(handle).is_err() {
        return;
    }

    let registry = Registry::new();

    let operations_counter = IntCounterVec::new(
        Opts::new(
            "booking_operations_total",
            "Booking lifecycle operations by kind and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create booking_operations_total metric");

    let processor_counter = IntCounterVec::new(
        Opts::new(
            "booking_processor_calls_total",
            "Payment processor calls by endpoint and result",
        ),
        &["endpoint", "result"],
    )
    .expect("Failed to create booking_processor_calls_total metric");

    let move_size_histogram = HistogramVec::new(
        HistogramOpts::new(
            "booking_participant_move_size",
            "Participants moved per reschedule",
        )
        .buckets(vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0]),
        &["operation"],
    )
    .expect("Failed to create booking_participant_move_size metric");

    registry
        .register(Box::new(operations_counter.clone()))
        .expect("Failed to register booking_operations_total");
    registry
        .register(Box::new(processor_counter.clone()))
        .expect("Failed to register booking_processor_calls_total");
    registry
        .register(Box::new(move_size_histogram.clone()))
        .expect("Failed to register booking_participant_move_size");

    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = BOOKING_OPERATIONS_TOTAL.set(operations_counter);
    let _ = PROCESSOR_CALLS_TOTAL.set(processor_counter);
    let _ = PARTICIPANT_MOVE_SIZE.set(move_size_histogram);
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record a booking lifecycle operation outcome.
pub fn record_operation(operation: &str, outcome: &str) {
    if let Some(counter) = BOOKING_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record one call against the payment processor.
pub fn record_processor_call(endpoint: &str, result: &str) {
    if let Some(counter) = PROCESSOR_CALLS_TOTAL.get() {
        counter.with_label_values(&[endpoint, result]).inc();
    }
}

/// Record how many participants a reschedule moved.
pub fn record_move_size(operation: &str, participants: u32) {
    if let Some(histogram) = PARTICIPANT_MOVE_SIZE.get() {
        histogram
            .with_label_values(&[operation])
            .observe(participants as f64);
    }
}
