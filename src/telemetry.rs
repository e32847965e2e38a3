use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber. `log_level` is used as the
/// default filter directive when `RUST_LOG` isn't set, so operators can
/// tune verbosity through the same `LOG_LEVEL` knob as the rest of
/// `Config` without also having to know about `RUST_LOG`.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt().with_env_filter(filter).with_target(true).init();
}
