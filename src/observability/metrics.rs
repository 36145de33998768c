//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define reply pipeline metrics (responses, errors, hook latency)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `reply_responses_total` (counter): responses handed to the transport, by status and payload kind
//! - `reply_pipeline_errors_total` (counter): hook, handler, stream and serialization failures by code
//! - `reply_double_send_total` (counter): rejected second sends
//! - `reply_hook_duration_seconds` (histogram): time spent in each onSend hook
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels are low-cardinality (status code, kind, hook name)

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder");
        }
    }
}

fn describe() {
    describe_counter!("reply_responses_total", "Responses handed to the transport");
    describe_counter!("reply_pipeline_errors_total", "Failures substituted with error responses");
    describe_counter!("reply_double_send_total", "Rejected attempts to send a reply twice");
    describe_histogram!("reply_hook_duration_seconds", "Time spent in onSend hooks");
}

/// Record a response at the moment of hand-off.
pub fn record_response(status: u16, kind: &str) {
    counter!(
        "reply_responses_total",
        "status" => status.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a pipeline failure by its error code.
pub fn record_pipeline_error(code: &str) {
    counter!("reply_pipeline_errors_total", "code" => code.to_string()).increment(1);
}

pub fn record_double_send() {
    counter!("reply_double_send_total").increment(1);
}

/// Record how long a single hook took, measured from `started`.
pub fn record_hook(hook: &str, started: Instant) {
    histogram!("reply_hook_duration_seconds", "hook" => hook.to_string())
        .record(started.elapsed().as_secs_f64());
}
