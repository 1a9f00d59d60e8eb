//! Tracing subscriber setup. `RUST_LOG` overrides the CLI level.

use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LEVEL: &str = "info";

pub fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Installs a stderr subscriber. Calling it twice is harmless.
pub fn init_logging(level: &str) {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
