use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. `RUST_LOG` directives, when set, take
/// precedence over the configured level.
pub fn configure_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let layer = match config.format {
        LogFormat::Json => fmt::Layer::<Registry>::default().json().boxed(),
        LogFormat::Text => fmt::Layer::<Registry>::default().compact().boxed(),
    };

    // A subscriber may already be installed, e.g. by an embedding test.
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();
}
