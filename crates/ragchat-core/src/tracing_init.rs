//! Tracing/logging initialization.
//!
//! Logs go to stderr so stdout stays clean for streamed answers. The filter
//! layer is wrapped in `reload` so the CLI debug toggle can flip verbosity at
//! runtime.

use tracing_subscriber::{
    EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Handle for swapping the active filter at runtime.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Initialise the global tracing subscriber.
///
/// `default_filter` is the `RUST_LOG` value used when the env-var is not set
/// (e.g. `"ragchat=info"`). Returns a handle for later filter reloads.
pub fn init_tracing(default_filter: &str) -> FilterHandle {
    let env_filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let (filter, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

/// Swap the active filter for a new directive string.
pub fn reload_filter(handle: &FilterHandle, directives: &str) -> Result<()> {
    handle
        .reload(EnvFilter::new(directives))
        .map_err(|e| Error::Tracing(e.to_string()))
}
