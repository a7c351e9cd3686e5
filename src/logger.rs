use std::time::Duration;

use hyper::{Method, StatusCode};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "http_file_service=info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

pub fn log_request(method: &Method, path: &str, status: StatusCode, duration: Duration) {
    info!(
        target: "request",
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );
}
