//! Prometheus collectors for the worker
//!
//! Collectors live in the default registry and are created on first use.
//! Processing code reports through [`ProcessingMetrics`] so tests can swap in
//! a recorder.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, TextEncoder,
};

static MESSAGES_PROCESSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "image_worker_messages_processed_total",
            "Total number of commands processed",
        ),
        &["command", "status"],
    )
    .expect("failed to create image_worker_messages_processed_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register image_worker_messages_processed_total");
    counter
});

static MESSAGE_PROCESSING_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "image_worker_message_processing_duration_seconds",
            "Duration of command processing in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["command"],
    )
    .expect("failed to create image_worker_message_processing_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register image_worker_message_processing_duration_seconds");
    histogram
});

static DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "image_worker_decode_failures_total",
        "Messages that matched neither payload format",
    )
    .expect("failed to create image_worker_decode_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register image_worker_decode_failures_total");
    counter
});

static COMMANDS_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "image_worker_commands_sent_total",
            "Commands published through the HTTP send endpoint",
        ),
        &["status"],
    )
    .expect("failed to create image_worker_commands_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register image_worker_commands_sent_total");
    counter
});

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("image_worker_http_requests_total", "Total HTTP requests served"),
        &["method", "path", "status"],
    )
    .expect("failed to create image_worker_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register image_worker_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "image_worker_http_request_duration_seconds",
            "HTTP request latency in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "path"],
    )
    .expect("failed to create image_worker_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register image_worker_http_request_duration_seconds");
    histogram
});

static CONSUMER_LAG: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "image_worker_consumer_lag",
            "Messages between the last fetched offset and the partition high watermark",
        ),
        &["topic", "partition"],
    )
    .expect("failed to create image_worker_consumer_lag");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register image_worker_consumer_lag");
    gauge
});

/// Observation hooks called once per processing attempt
pub trait ProcessingMetrics: Send + Sync {
    fn record_processed(&self, command: &str, status: &str);
    fn observe_duration(&self, command: &str, seconds: f64);
}

/// Reports into the default Prometheus registry
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl ProcessingMetrics for PrometheusMetrics {
    fn record_processed(&self, command: &str, status: &str) {
        MESSAGES_PROCESSED_TOTAL
            .with_label_values(&[command, status])
            .inc();
    }

    fn observe_duration(&self, command: &str, seconds: f64) {
        MESSAGE_PROCESSING_DURATION_SECONDS
            .with_label_values(&[command])
            .observe(seconds);
    }
}

pub fn record_decode_failure() {
    DECODE_FAILURES_TOTAL.inc();
}

pub fn record_command_sent(status: &str) {
    COMMANDS_SENT_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_http_request(method: &str, path: &str, status: u16, seconds: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(seconds);
}

/// Lag after fetching `offset`; never negative
pub fn set_consumer_lag(topic: &str, partition: i32, offset: i64, high_watermark: i64) {
    let lag = (high_watermark - offset - 1).max(0);
    CONSUMER_LAG
        .with_label_values(&[topic, &partition.to_string()])
        .set(lag);
}

/// Text exposition of every registered collector
pub fn render() -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    let body = String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {e}")))?;
    Ok((encoder.format_type().to_string(), body))
}
