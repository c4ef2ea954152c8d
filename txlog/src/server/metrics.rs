//! Prometheus metrics for the txlog server.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels for HTTP request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabelsWithStatus {
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
}

/// HTTP method label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Post,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::POST => HttpMethod::Post,
            _ => HttpMethod::Other,
        }
    }
}

/// Labels for HTTP request latency histogram (without status, since status is unknown at start).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: HttpMethod,
    pub endpoint: String,
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of transactions successfully submitted.
    pub txlog_submitted_transactions_total: Counter,

    /// Counter of events in successfully submitted transactions.
    pub txlog_submitted_events_total: Counter,

    /// Counter of submits that failed.
    pub txlog_submit_errors_total: Counter,

    /// Counter of transactions returned by reads.
    pub txlog_read_transactions_total: Counter,

    /// Counter of HTTP requests.
    pub http_requests_total: Family<HttpLabelsWithStatus, Counter>,

    /// Histogram of HTTP request latency in seconds.
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,

    /// Gauge of currently in-flight requests.
    pub http_requests_in_flight: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let txlog_submitted_transactions_total = Counter::default();
        registry.register(
            "txlog_submitted_transactions_total",
            "Total number of transactions submitted to the log",
            txlog_submitted_transactions_total.clone(),
        );

        let txlog_submitted_events_total = Counter::default();
        registry.register(
            "txlog_submitted_events_total",
            "Total number of events in submitted transactions",
            txlog_submitted_events_total.clone(),
        );

        let txlog_submit_errors_total = Counter::default();
        registry.register(
            "txlog_submit_errors_total",
            "Total number of failed submits",
            txlog_submit_errors_total.clone(),
        );

        let txlog_read_transactions_total = Counter::default();
        registry.register(
            "txlog_read_transactions_total",
            "Total number of transactions returned by reads",
            txlog_read_transactions_total.clone(),
        );

        let http_requests_total = Family::<HttpLabelsWithStatus, Counter>::default();
        registry.register(
            "http_requests_total",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        // Buckets from 1ms to ~8s
        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 14))
            });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_requests_in_flight = Gauge::default();
        registry.register(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
            http_requests_in_flight.clone(),
        );

        Self {
            registry,
            txlog_submitted_transactions_total,
            txlog_submitted_events_total,
            txlog_submit_errors_total,
            txlog_read_transactions_total,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(err) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::warn!(error = %err, "failed to encode metrics");
        }
        buffer
    }
}
