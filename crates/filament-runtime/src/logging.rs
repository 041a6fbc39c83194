//! Logging setup on top of `tracing-subscriber`.
//!
//! One call wires the whole stack:
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().with_current_dir().load()?;
//! filament_runtime::logging::init(&config.logging);
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level, so operators can
//! raise verbosity per module without touching the config file.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingSettings};

/// Initializes logging, ignoring a second initialization.
pub fn init(config: &LoggingSettings) {
    let _ = try_init(config);
}

/// Initializes logging, surfacing the error when a subscriber is already
/// installed.
pub fn try_init(config: &LoggingSettings) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match config.format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(filter)
            .try_init(),
        LogFormat::Full => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(filter)
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn double_initialization_is_tolerated() {
        let settings = LoggingSettings {
            level: LogLevel::Debug,
            format: LogFormat::Compact,
        };
        init(&settings);
        // second call must not panic
        init(&settings);
    }
}
