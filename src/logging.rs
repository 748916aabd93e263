use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Output goes to stderr so the stdio
/// transport keeps stdout for protocol lines only.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

pub fn log_rpc_summary(method: &str, id: Option<&Value>, succeeded: bool, elapsed: Duration) {
    let id = id.map_or_else(|| "-".to_string(), Value::to_string);
    let elapsed_ms = elapsed.as_millis();

    info!(
        method = %method,
        id = %id,
        outcome = if succeeded { "success" } else { "failure" },
        duration_ms = elapsed_ms,
        "request summary"
    );

    if !succeeded && method == "initialize" {
        warn!(id = %id, "client initialization rejected");
    }
}
