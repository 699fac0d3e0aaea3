//! Logger builder implementation

mod reload;

pub use reload::ReloadHandle;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, DisplayConfig, Format};
use crate::core::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Holds the root span and the reload handle. Dropping it leaves the global
/// subscriber installed but exits the root span.
#[derive(Debug)]
pub struct LoggerGuard {
    inner: Option<Box<Inner>>,
}

struct Inner {
    reload_handle: Option<ReloadHandle>,
    _root_span_guard: Option<tracing::span::EnteredSpan>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("reloadable", &self.reload_handle.is_some())
            .finish_non_exhaustive()
    }
}

/// Install `Registry + filter + fmt` as the global default, dropping the
/// timer when the display config asks for it.
macro_rules! try_init_subscriber {
    ($filter_layer:ident, $fmt_layer:ident, $time:expr) => {
        if $time {
            Registry::default()
                .with($filter_layer)
                .with($fmt_layer)
                .try_init()
        } else {
            Registry::default()
                .with($filter_layer)
                .with($fmt_layer.without_time())
                .try_init()
        }
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the logger as the global default
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Filter`] if the filter cannot be parsed and
    /// [`LogError::AlreadyInitialized`] if a global subscriber exists.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = parse_filter(&self.config.level)?;
        let (filter_layer, reload_handle) =
            reload::create_filter_layer(filter, &self.config.level, self.config.reloadable);

        let display: &DisplayConfig = &self.config.display;
        let installed = match self.config.format {
            Format::Pretty => {
                let fmt_layer = tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(display.colors)
                    .with_target(display.target)
                    .with_file(display.source)
                    .with_line_number(display.source)
                    .with_thread_ids(display.thread_ids);
                try_init_subscriber!(filter_layer, fmt_layer, display.time)
            }
            Format::Compact => {
                let fmt_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(display.colors)
                    .with_target(display.target)
                    .with_file(display.source)
                    .with_line_number(display.source)
                    .with_thread_ids(display.thread_ids);
                try_init_subscriber!(filter_layer, fmt_layer, display.time)
            }
            Format::Json => {
                let fmt_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(display.flatten)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(display.target)
                    .with_file(display.source)
                    .with_line_number(display.source)
                    .with_thread_ids(display.thread_ids);
                try_init_subscriber!(filter_layer, fmt_layer, display.time)
            }
        };
        installed.map_err(|_| LogError::AlreadyInitialized)?;

        let fields = &self.config.fields;
        let root_span = (!fields.is_empty()).then(|| {
            tracing::info_span!(
                "app",
                service = fields.service.as_deref().unwrap_or(""),
                env = fields.env.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or("")
            )
            .entered()
        });

        tracing::debug!(
            format = %self.config.format,
            filter = %self.config.level,
            "logger initialized"
        );

        Ok(LoggerGuard {
            inner: Some(Box::new(Inner {
                reload_handle,
                _root_span_guard: root_span,
            })),
        })
    }
}

impl LoggerGuard {
    /// Handle for changing the filter at runtime, when the config was reloadable
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.inner.as_ref()?.reload_handle.as_ref()
    }

    /// Guard for a subscriber installed elsewhere
    pub(crate) const fn noop() -> Self {
        Self { inner: None }
    }
}

pub(crate) fn parse_filter(level: &str) -> LogResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| LogError::Filter(format!("{level}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = Config {
            level: "gitlab=loud=very".to_string(),
            ..Config::default()
        };

        let err = LoggerBuilder::from_config(config).build().unwrap_err();

        assert!(matches!(err, LogError::Filter(msg) if msg.starts_with("gitlab=loud=very")));
    }

    #[test]
    fn noop_guard_has_no_reload_handle() {
        assert!(LoggerGuard::noop().reload_handle().is_none());
    }
}
