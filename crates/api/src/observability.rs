use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "lapak_api_http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "lapak_api_http_request_duration_seconds";
const HTTP_REQUEST_ERRORS_TOTAL: &str = "lapak_api_http_errors_total";
const CHAT_PUBLISHES_TOTAL: &str = "lapak_api_chat_publishes_total";
const CHAT_DELIVERIES_TOTAL: &str = "lapak_api_chat_deliveries_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_http_request(method: &str, route: &str, status: StatusCode, elapsed: Duration) {
    let status_code = status.as_u16().to_string();
    let duration_seconds = elapsed.as_secs_f64();
    let result = if status.is_server_error() {
        "error"
    } else {
        "success"
    };

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone(),
        "result" => result
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code
    )
    .record(duration_seconds);

    if status.is_server_error() {
        counter!(
            HTTP_REQUEST_ERRORS_TOTAL,
            "method" => method.to_string(),
            "route" => route.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);
    }
}

/// One publish increments the publish counter once; member deliveries
/// accumulate in their own series so the two units never mix.
pub fn register_chat_fanout(delivered: usize) {
    let reach = if delivered == 0 { "empty_room" } else { "delivered" };
    counter!(CHAT_PUBLISHES_TOTAL, "reach" => reach).increment(1);
    if delivered > 0 {
        counter!(CHAT_DELIVERIES_TOTAL).increment(delivered as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_counts_publishes_and_deliveries_separately() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_chat_fanout(3);
            register_chat_fanout(0);
        });

        let rendered = handle.render();
        assert!(rendered.contains(
            "lapak_api_chat_publishes_total{reach=\"delivered\"} 1"
        ));
        assert!(rendered.contains(
            "lapak_api_chat_publishes_total{reach=\"empty_room\"} 1"
        ));
        assert!(rendered.contains("lapak_api_chat_deliveries_total 3"));
    }
}
