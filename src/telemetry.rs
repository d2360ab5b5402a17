// src/telemetry.rs
// =============================================================================
// Logging setup.
//
// All progress and dead-URL lines go through `tracing` to stderr, so stdout
// only carries the final report (handy with --json). RUST_LOG overrides the
// default filter, e.g. RUST_LOG=sitemap_checker=debug.
// =============================================================================

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
