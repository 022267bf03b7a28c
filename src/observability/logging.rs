//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Change the log level at runtime when the configuration is reloaded
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level, at startup and on reload
//! - The filter sits behind a `reload` layer so a new level applies to the
//!   running process without reinstalling the subscriber

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("cannot apply log filter: {0}")]
    Reload(#[from] reload::Error),

    #[error("logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Handle used to change the active filter later.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogHandle {
    pub fn new(filter: reload::Handle<EnvFilter, Registry>, env_override: bool) -> Self {
        Self {
            filter,
            env_override,
        }
    }

    /// Apply `level` unless `RUST_LOG` was set at startup.
    pub fn set_level(&self, level: &str) -> Result<(), LoggingError> {
        if self.env_override {
            tracing::debug!(level, "RUST_LOG set, ignoring configured log level");
            return Ok(());
        }
        self.filter.reload(build_filter(level)?)?;
        tracing::info!(level, "Log level applied");
        Ok(())
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("env_override", &self.env_override)
            .finish_non_exhaustive()
    }
}

pub fn build_filter(directives: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(directives)
}

/// Install the global subscriber with `level` as the initial filter.
pub fn init(level: &str) -> Result<LogHandle, LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok().filter(|v| !v.is_empty());
    let filter = build_filter(env.as_deref().unwrap_or(level))?;
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;

    Ok(LogHandle::new(handle, env.is_some()))
}
