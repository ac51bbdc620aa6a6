use axum::{extract::State, http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use super::state::GuardedQueueStore;

/// Metric name prefix for all ingest server metrics
const PREFIX: &str = "ingest";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Job Metrics
    pub static ref JOBS_FINISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_finished_total"), "Jobs that reached a final state"),
        &["status", "error_code"]
    ).expect("Failed to create jobs_finished_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Time a worker spent on one job"
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["status"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref DOWNLOAD_QUEUE_PENDING: IntGauge = IntGauge::new(
        format!("{PREFIX}_download_queue_pending"),
        "Jobs waiting for a worker"
    ).expect("Failed to create download_queue_pending metric");

    // WebSocket Metrics
    pub static ref WS_CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        format!("{PREFIX}_ws_connections_active"),
        "Open progress WebSocket connections"
    ).expect("Failed to create ws_connections_active metric");
}

/// Registers every metric. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_FINISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(DOWNLOAD_QUEUE_PENDING.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTIONS_ACTIVE.clone()));
}

/// Record an HTTP request. `path` is the route template, never the raw URI.
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record how a job ended. `error_code` is empty for jobs that did not fail.
pub fn record_job_finished(status: &str, error_code: &str, duration: Duration) {
    JOBS_FINISHED_TOTAL
        .with_label_values(&[status, error_code])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

pub fn set_pending_jobs(count: usize) {
    DOWNLOAD_QUEUE_PENDING.set(count as i64);
}

pub fn ws_connected() {
    WS_CONNECTIONS_ACTIVE.inc();
}

pub fn ws_disconnected() {
    WS_CONNECTIONS_ACTIVE.dec();
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(State(queue): State<GuardedQueueStore>) -> impl IntoResponse {
    match queue.pending_count() {
        Ok(count) => set_pending_jobs(count),
        Err(e) => tracing::warn!("Failed to count pending jobs: {}", e),
    }

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(name: &str) -> Option<prometheus::proto::MetricFamily> {
        REGISTRY
            .gather()
            .into_iter()
            .find(|m| m.get_name() == format!("{PREFIX}_{name}"))
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();
        init_metrics();
        assert!(family("download_queue_pending").is_some());
        assert!(family("ws_connections_active").is_some());
    }

    #[test]
    fn test_record_http_request_by_route() {
        init_metrics();
        record_http_request("GET", "/downloads/{job_id}", 404, Duration::from_millis(3));

        let counter = HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "/downloads/{job_id}", "404"]);
        assert!(counter.get() >= 1.0);
        assert!(family("http_request_duration_seconds").is_some());
    }

    #[test]
    fn test_job_outcomes_are_labelled_by_error_code() {
        init_metrics();
        let before = JOBS_FINISHED_TOTAL
            .with_label_values(&["failed", "JOB_TIMEOUT"])
            .get();
        record_job_finished("failed", "JOB_TIMEOUT", Duration::from_secs(600));
        record_job_finished("completed", "", Duration::from_secs(20));

        let after = JOBS_FINISHED_TOTAL
            .with_label_values(&["failed", "JOB_TIMEOUT"])
            .get();
        assert_eq!(after - before, 1.0);
        assert!(JOBS_FINISHED_TOTAL.with_label_values(&["completed", ""]).get() >= 1.0);
    }
}
