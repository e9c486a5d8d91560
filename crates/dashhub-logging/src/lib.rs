//! # dashhub-logging
//!
//! Installs the process-wide `tracing` subscriber: an [`EnvFilter`] built
//! from a base level plus per-module overrides (`RUST_LOG` wins when set),
//! and a JSON or human-readable formatting layer on stdout.

#![deny(unsafe_code)]

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A level string did not name a level.
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    /// A subscriber was already installed.
    #[error("logging already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Subscriber configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Base level.
    pub level: Level,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module overrides, e.g. `("dashhub_core", DEBUG)`.
    pub module_levels: Vec<(String, Level)>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            module_levels: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Build from string levels as they appear in settings files.
    pub fn parse<I, K, V>(level: &str, json: bool, module_levels: I) -> Result<Self, LoggingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let module_levels = module_levels
            .into_iter()
            .map(|(module, lvl)| parse_level(lvl.as_ref()).map(|l| (module.into(), l)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            level: parse_level(level)?,
            json,
            module_levels,
        })
    }

    /// Filter directive string, e.g. `info,dashhub_core=debug`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.as_str().to_lowercase();
        for (module, level) in &self.module_levels {
            directives.push_str(&format!(",{module}={}", level.as_str().to_lowercase()));
        }
        directives
    }
}

/// Parse `error`/`warn`/`info`/`debug`/`trace`, any case.
pub fn parse_level(s: &str) -> Result<Level, LoggingError> {
    Level::from_str(s.trim()).map_err(|_| LoggingError::InvalidLevel(s.to_owned()))
}

/// Filter for `config`, unless `RUST_LOG` is set.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config);
    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialised(e.to_string()))
}
