//! Prometheus metrics for the synthetic server.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::ServerError;
use crate::simulation::StreamEvent;

/// Global peak streams tracker.
static PEAK_STREAMS: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics descriptions.
pub fn init_metrics() {
    describe_counter!(
        "synthetic_connections_total",
        "Total number of connections accepted"
    );
    describe_counter!("synthetic_requests_total", "Requests by route");
    describe_counter!(
        "synthetic_config_errors_total",
        "Requests rejected before streaming"
    );

    describe_counter!(
        "synthetic_fanout_calls_total",
        "Fan-out calls by mode and outcome"
    );

    describe_gauge!("synthetic_active_streams", "Number of streams in flight");
    describe_gauge!(
        "synthetic_peak_streams",
        "Peak number of concurrent streams seen"
    );
    describe_counter!("synthetic_frames_sent_total", "Delta frames handed to clients");
    describe_counter!("synthetic_bytes_sent_total", "SSE bytes handed to clients");
    describe_counter!(
        "synthetic_stream_faults_total",
        "Streams that ended with an error frame"
    );
    describe_histogram!(
        "synthetic_stream_duration_seconds",
        "Total stream duration per request"
    );
}

/// Start the Prometheus metrics HTTP server.
pub fn start_metrics_server(addr: SocketAddr) -> Result<(), ServerError> {
    // 10ms to ~163s (exponential buckets base 0.01, factor 2, count 15)
    let duration_buckets: [f64; 15] = [
        0.01, 0.02, 0.04, 0.08, 0.16, 0.32, 0.64, 1.28, 2.56, 5.12, 10.24, 20.48, 40.96, 81.92,
        163.84,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("synthetic_stream_duration_seconds".to_string()),
            &duration_buckets,
        )
        .map_err(|e| ServerError::Metrics(e.to_string()))?
        .with_http_listener(addr)
        .install()
        .map_err(|e| ServerError::Metrics(format!("Failed to start metrics server: {}", e)))?;

    tracing::info!(%addr, "Metrics server started");
    Ok(())
}

/// Record connection accepted.
pub fn record_connection_accepted() {
    counter!("synthetic_connections_total").increment(1);
}

/// Record a request on a route.
pub fn record_request(route: &'static str) {
    counter!("synthetic_requests_total", "route" => route).increment(1);
}

/// Record a request rejected by parameter resolution.
pub fn record_config_error() {
    counter!("synthetic_config_errors_total").increment(1);
}

/// Record one fan-out call.
pub fn record_fanout_call(mode: &'static str, outcome: &'static str) {
    counter!("synthetic_fanout_calls_total", "mode" => mode, "outcome" => outcome).increment(1);
}

/// Record an encoded event handed to the client.
pub fn record_event_sent(event: &StreamEvent, bytes: usize) {
    if matches!(event, StreamEvent::Delta { .. }) {
        counter!("synthetic_frames_sent_total").increment(1);
    }
    counter!("synthetic_bytes_sent_total").increment(bytes as u64);
}

/// Record a stream that ended with an error frame.
pub fn record_stream_fault() {
    counter!("synthetic_stream_faults_total").increment(1);
}

/// Record stream start with the new active count, updating the peak.
pub fn record_stream_start(current: u64) {
    gauge!("synthetic_active_streams").set(current as f64);

    // Update peak if needed using CAS loop
    loop {
        let peak = PEAK_STREAMS.load(Ordering::Relaxed);
        if current <= peak {
            break;
        }
        if PEAK_STREAMS
            .compare_exchange_weak(peak, current, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            gauge!("synthetic_peak_streams").set(current as f64);
            break;
        }
    }
}

/// Update active streams gauge.
pub fn set_active_streams(count: u64) {
    gauge!("synthetic_active_streams").set(count as f64);
}

/// Record total stream duration.
pub fn record_stream_duration(duration: Duration) {
    histogram!("synthetic_stream_duration_seconds").record(duration.as_secs_f64());
}

/// Highest number of concurrent streams seen by this process.
pub fn peak_streams() -> u64 {
    PEAK_STREAMS.load(Ordering::Relaxed)
}
