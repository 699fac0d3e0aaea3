//! Host event sink

use std::collections::HashMap;

use async_trait::async_trait;

/// Receives lifecycle events from the engine
///
/// Delivery is best-effort: the engine logs and drops any error returned
/// here.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event
    async fn send_event(
        &self,
        event_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), String>;
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn send_event(
        &self,
        _event_type: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<(), String> {
        Ok(())
    }
}
