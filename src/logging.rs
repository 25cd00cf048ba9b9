//! Subscriber installation for the gateway binary.
//!
//! Library code logs through the `log` facade and `tracing`. Embedding
//! applications install their own subscriber; [`init`] is what the bundled
//! binary uses.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSettings;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter {level:?}: {source}")]
    Filter {
        /// Directive that failed to parse.
        level: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` wins, otherwise `settings.level`.
///
/// # Errors
///
/// [`LoggingError::Filter`] if `RUST_LOG` is unset and `settings.level` does
/// not parse.
pub fn filter(settings: &LoggingSettings) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.level).map_err(|source| LoggingError::Filter {
        level: settings.level.clone(),
        source,
    })
}

/// Install a global subscriber writing plain text or JSON lines.
///
/// # Errors
///
/// See [`LoggingError`].
pub fn init(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);
    if settings.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}
