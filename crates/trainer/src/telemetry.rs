//! Tracing setup for binaries that embed the trainer
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! caller's choice. `RUST_LOG` wins over the configured level.

use gaussmix_config::ObservabilityConfig;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Filter directive for the configured level
fn default_directive(config: &ObservabilityConfig) -> String {
    let level = config.log_level.to_ascii_lowercase();
    format!("gaussmix_trainer={level},gaussmix_core={level},gaussmix_config={level}")
}

/// Install a global fmt subscriber (JSON when `log_json` is set).
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(config).into());

    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}
