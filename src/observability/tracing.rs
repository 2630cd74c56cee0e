use anyhow::{Error, Result};
use std::sync::OnceLock;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes the global tracing subscriber exactly once: an `EnvFilter`
/// (defaulting to `info`) plus a JSON-formatted fmt layer on stdout.
///
/// # Errors
/// Returns an error if a subscriber has already been installed by something
/// else in the process.
pub fn init() -> Result<()> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|error| Error::msg(error.to_string()))?;

    TRACING_INIT.set(()).ok();
    info!("tracing initialized");
    Ok(())
}
