//! Logging setup and component-scoped loggers.
//!
//! The subscriber is installed once by the binary through [`init`]. Library
//! components never touch global state: they receive a [`Logger`] at
//! construction and derive child loggers from it with [`Logger::named`].

use std::sync::Arc;
use thiserror::Error;
use tracing::{info_span, Span};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global `tracing` subscriber.
///
/// Events are written to stderr. The filter comes from `RUST_LOG` and falls
/// back to `info`. Records emitted through the `log` facade are bridged by
/// the subscriber.
pub fn init(format: LogFormat) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

/// A named logging scope handed to a component.
///
/// Events are attached to the logger's span with the `parent:` form of the
/// `tracing` macros:
///
/// ```ignore
/// tracing::info!(parent: logger.span(), count = 3, "processed delete request");
/// ```
#[derive(Debug, Clone)]
pub struct Logger {
    name: Arc<str>,
    span: Span,
}

impl Logger {
    /// Creates a top-level logger.
    pub fn root(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            span: info_span!("component", name = %name),
        }
    }

    /// Derives a child logger named `<parent>.<name>`.
    ///
    /// The parent is left untouched.
    pub fn named(&self, name: &str) -> Self {
        let full = format!("{}.{}", self.name, name);
        let span = info_span!(parent: &self.span, "component", name = %full);
        Self {
            name: Arc::from(full),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
