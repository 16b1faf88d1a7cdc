//! Tracing initialization for hosts embedding the engine.
//!
//! The engine itself only emits `tracing` events and spans; hosts decide
//! how they are collected. [`init_tracing`] installs a sensible default
//! subscriber (env-filtered fmt output plus span-trace capture) for
//! binaries and examples that do not bring their own.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the default tracing subscriber.
///
/// Filter directives come from `RUST_LOG`, defaulting to `info`. Calling
/// this more than once is harmless: later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(ErrorLayer::default())
        .try_init()
        .ok();
}
