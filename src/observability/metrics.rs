//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tinyrpc_calls_total` (counter): calls by path, outcome. Unrouted calls
//!   share the `<unknown>` path so callers cannot grow the label set
//! - `tinyrpc_call_duration_seconds` (histogram): dispatch latency
//! - `tinyrpc_active_connections` (gauge): current connection count
//! - `tinyrpc_client_calls_total` (counter): client calls by procedure, outcome

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// How a dispatched call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// A registered procedure ran.
    Dispatched,
    /// No procedure matched the routing key.
    NotFound,
    /// A middleware or the procedure panicked.
    Failed,
}

impl CallOutcome {
    fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Dispatched => "dispatched",
            CallOutcome::NotFound => "not_found",
            CallOutcome::Failed => "failed",
        }
    }
}

/// Path label for the calls counter.
pub const UNKNOWN_PATH: &str = "<unknown>";

fn path_label(path: &str, outcome: CallOutcome) -> &str {
    match outcome {
        CallOutcome::NotFound => UNKNOWN_PATH,
        CallOutcome::Dispatched | CallOutcome::Failed => path,
    }
}

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one server-side call.
pub fn record_call(path: &str, outcome: CallOutcome, start: Instant) {
    counter!(
        "tinyrpc_calls_total",
        "path" => path_label(path, outcome).to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("tinyrpc_call_duration_seconds", "outcome" => outcome.as_str())
        .record(start.elapsed().as_secs_f64());
}

/// Record one client-side call.
pub fn record_client_call(procedure: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        "tinyrpc_client_calls_total",
        "procedure" => procedure.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Publish the number of open server connections.
pub fn set_active_connections(count: u64) {
    gauge!("tinyrpc_active_connections").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrouted_paths_collapse_to_one_label() {
        assert_eq!(path_label("/random-1", CallOutcome::NotFound), UNKNOWN_PATH);
        assert_eq!(path_label("/random-2", CallOutcome::NotFound), UNKNOWN_PATH);
        assert_eq!(path_label("/hi", CallOutcome::Dispatched), "/hi");
        assert_eq!(path_label("/boom", CallOutcome::Failed), "/boom");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_call("/hi", CallOutcome::Dispatched, Instant::now());
        record_call("/nope", CallOutcome::NotFound, Instant::now());
        record_client_call("hi", false);
        set_active_connections(3);
    }
}
