use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber. Safe to call once per process;
/// honors `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
