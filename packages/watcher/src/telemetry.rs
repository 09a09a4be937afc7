//! Structured logging setup.
//!
//! Verbosity comes from `RUST_LOG`; without it the watcher logs at INFO and its own
//! crate at DEBUG.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,pairscout_watcher=debug,pairscout=debug";

/// `LOG_FORMAT` value that selects JSON output
pub const JSON_FORMAT: &str = "json";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Compact human-readable logs
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// One JSON object per line, for log aggregation
pub fn init_telemetry_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
        .init();
}

/// Pick the output format from a `LOG_FORMAT` value
pub fn init_from_format(format: Option<&str>) {
    if wants_json(format) {
        init_telemetry_json();
    } else {
        init_telemetry();
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case(JSON_FORMAT))
}
