//! Shared helpers for the HTTP integration tests.

use serde_json::Value;
use workflow_monitor::MonitorConfig;

/// Config pointed at a mock server, with short timings so retries finish fast.
pub fn config_for(base_url: &str) -> MonitorConfig {
    MonitorConfig {
        base_url: base_url.to_string(),
        request_timeout_ms: 5_000,
        backoff_unit_ms: 10,
        results_delay_ms: 0,
        ..MonitorConfig::default()
    }
}

/// Render payloads as an SSE body, with a heartbeat comment between frames
/// the way the service sends them.
pub fn sse_body(payloads: &[Value]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str(": heartbeat\n\n");
        body.push_str(&format!("data: {payload}\n\n"));
    }
    body
}
