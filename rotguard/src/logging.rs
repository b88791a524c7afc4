//! Global tracing subscriber for the CLI.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` from the config; otherwise `info`.
fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(level: &str) {
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(level))
        .with_writer(std::io::stdout)
        .with_target(false)
        .try_init();
}
