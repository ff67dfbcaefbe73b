//! Tracing bootstrap shared by the binaries.

/// Install the global subscriber: env-filtered, compact fmt output.
/// `RUST_LOG` overrides the default filter.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("abacus=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
