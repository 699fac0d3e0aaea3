//! Runtime filter reload

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, Registry, layer::Layer};

use crate::core::{LogError, LogResult};

/// Handle for changing the active filter after initialisation
#[derive(Clone)]
pub struct ReloadHandle {
    filter: tracing_subscriber::reload::Handle<EnvFilter, Registry>,
    current_filter: Arc<ArcSwap<String>>,
}

impl std::fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("current_filter", &self.current_filter.load())
            .finish_non_exhaustive()
    }
}

impl ReloadHandle {
    /// Replace the log filter
    ///
    /// # Errors
    /// Returns [`LogError::Filter`] for an unparsable filter and
    /// [`LogError::Config`] when the subscriber is gone.
    pub fn reload(&self, filter: &str) -> LogResult<()> {
        let new_filter = super::parse_filter(filter)?;
        self.filter
            .reload(new_filter)
            .map_err(|e| LogError::Config(format!("failed to reload filter: {e}")))?;
        self.current_filter.store(Arc::new(filter.to_string()));
        Ok(())
    }

    /// The filter string currently in effect
    pub fn current_filter(&self) -> Arc<String> {
        self.current_filter.load_full()
    }
}

/// Create the filter layer, wrapped in a reload layer when `reloadable`
pub(super) fn create_filter_layer(
    filter: EnvFilter,
    level: &str,
    reloadable: bool,
) -> (
    Box<dyn Layer<Registry> + Send + Sync + 'static>,
    Option<ReloadHandle>,
) {
    if reloadable {
        let (layer, handle) = tracing_subscriber::reload::Layer::new(filter);
        let reload_handle = ReloadHandle {
            filter: handle,
            current_filter: Arc::new(ArcSwap::from_pointee(level.to_string())),
        };
        (Box::new(layer), Some(reload_handle))
    } else {
        (Box::new(filter), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn reload_swaps_filter_while_subscriber_lives() {
        let filter = EnvFilter::new("info");
        let (layer, handle) = create_filter_layer(filter, "info", true);
        let handle = handle.unwrap();
        let _subscriber = Registry::default().with(layer);

        handle.reload("debug,gitlab_secrets_credential=trace").unwrap();

        assert_eq!(
            handle.current_filter().as_str(),
            "debug,gitlab_secrets_credential=trace"
        );
    }

    #[test]
    fn invalid_reload_keeps_previous_filter() {
        let (layer, handle) = create_filter_layer(EnvFilter::new("warn"), "warn", true);
        let handle = handle.unwrap();
        let _subscriber = Registry::default().with(layer);

        let err = handle.reload("gitlab=loud=very").unwrap_err();

        assert!(matches!(err, LogError::Filter(_)));
        assert_eq!(handle.current_filter().as_str(), "warn");
    }

    #[test]
    fn static_filter_has_no_handle() {
        let (_, handle) = create_filter_layer(EnvFilter::new("info"), "info", false);
        assert!(handle.is_none());
    }
}
