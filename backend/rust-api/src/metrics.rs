use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Duel Record Store
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "duel_store_operations_total",
        "Total number of duel store operations",
        &["operation", "backend", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "duel_store_operation_duration_seconds",
        "Duel store operation duration in seconds",
        &["operation", "backend"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]
    )
    .unwrap();

    // Duel lifecycle
    pub static ref DUELS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "duels_total",
        "Duels by lifecycle event",
        &["event"]
    )
    .unwrap();

    pub static ref DUELS_ACTIVE: IntGauge = register_int_gauge!(
        "duels_active",
        "Number of duels currently in the active state"
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "duel_answers_submitted_total",
        "Accepted answer submissions by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref SUBMISSIONS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "duel_submissions_rejected_total",
        "Rejected answer submissions by reason",
        &["reason"]
    )
    .unwrap();

    pub static ref TURN_TIMEOUTS_TOTAL: IntCounter = register_int_counter!(
        "duel_turn_timeouts_total",
        "Turns forced to a no-answer by the turn clock"
    )
    .unwrap();

    pub static ref BOT_ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "duel_bot_answers_total",
        "Answers submitted by bot responders",
        &["bot_id", "correct"]
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sse_connections_active",
        "Number of active duel SSE connections"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a duel store operation with metrics
pub async fn track_store_operation<F, T, E>(
    operation: &str,
    backend: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, backend, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, backend])
        .observe(duration);

    result
}

pub fn record_answer(is_correct: bool, timed_out: bool) {
    let outcome = if timed_out {
        "timeout"
    } else if is_correct {
        "correct"
    } else {
        "incorrect"
    };
    ANSWERS_SUBMITTED_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_rejection(reason: &str) {
    SUBMISSIONS_REJECTED_TOTAL
        .with_label_values(&[reason])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = DUELS_ACTIVE.get();
    }

    #[test]
    fn test_render_metrics() {
        record_answer(true, false);
        record_rejection("not_your_turn");

        let output = render_metrics().unwrap();
        assert!(output.contains("duel_answers_submitted_total"));
        assert!(output.contains("duel_submissions_rejected_total"));
    }

    #[tokio::test]
    async fn store_operations_are_counted_by_status() {
        let before = STORE_OPERATIONS_TOTAL
            .with_label_values(&["probe", "test", "error"])
            .get();
        let _: Result<(), &str> = track_store_operation("probe", "test", async { Err("x") }).await;
        let after = STORE_OPERATIONS_TOTAL
            .with_label_values(&["probe", "test", "error"])
            .get();
        assert_eq!(after, before + 1);
    }
}
