use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// `RUST_LOG` wins over the configured level.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.level),
    }
    .map_err(|e| anyhow!("Invalid log filter: {e}"))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for command output.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = filter(config)?;
    let layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialise logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_parsed() {
        let config = LoggingConfig {
            level: "squad_report=debug,warn".into(),
            json: false,
        };
        if std::env::var(EnvFilter::DEFAULT_ENV).is_err() {
            assert!(filter(&config).is_ok());
        }
    }
}
