pub mod cache;
pub mod client;
pub mod config;
pub mod debounce;
pub mod error;
pub mod escape;
pub mod live_tail;
pub mod models;
pub mod query;
pub mod session;
pub mod time_window;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Note: This function can only be called once per process. The embedding
/// application may install its own subscriber instead.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
