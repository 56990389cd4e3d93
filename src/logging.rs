use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::protocol::Protocol;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Emits the summary line for one routed call.
pub fn audit_call(protocol: Protocol, method: Option<&str>, succeeded: bool, elapsed: Duration) {
    info!(
        protocol = %protocol,
        method = method.unwrap_or("-"),
        outcome = if succeeded { "ok" } else { "error" },
        duration_ms = elapsed.as_millis(),
        "call summary"
    );
}

pub fn log_body(protocol: Protocol, direction: &'static str, body: &[u8]) {
    debug!(
        protocol = %protocol,
        direction,
        body = %String::from_utf8_lossy(body),
        "rpc payload"
    );
}
