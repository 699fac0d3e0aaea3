//! Lifecycle events
//!
//! Every successful mutation is reported to the host's [`EventSink`].
//! Delivery is best-effort: [`EventEmitter::emit`] logs a failure and carries
//! on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::traits::EventSink;

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Config created or replaced
    ConfigWrite,
    /// Config partially updated
    ConfigPatch,
    /// Config removed
    ConfigDelete,
    /// Config's privileged token replaced
    ConfigTokenRotate,
    /// Role created or replaced
    RoleWrite,
    /// Role removed
    RoleDelete,
    /// Downstream token minted
    TokenIssue,
    /// Downstream token revoked
    TokenRevoke,
}

impl EventType {
    /// Wire name of the event
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigWrite => "config-write",
            Self::ConfigPatch => "config-patch",
            Self::ConfigDelete => "config-delete",
            Self::ConfigTokenRotate => "config-token-rotate",
            Self::RoleWrite => "role-write",
            Self::RoleDelete => "role-delete",
            Self::TokenIssue => "token-issue",
            Self::TokenRevoke => "token-revoke",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends events to the host sink
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    /// Wrap a sink
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Send an event and report the sink's result
    pub async fn try_emit<I, K, V>(&self, event: EventType, metadata: I) -> Result<(), String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let metadata: HashMap<String, String> = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.sink.send_event(event.as_str(), metadata).await
    }

    /// Send an event, logging and dropping any failure
    pub async fn emit<I, K, V>(&self, event: EventType, metadata: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Err(error) = self.try_emit(event, metadata).await {
            tracing::warn!(event = %event, error = %error, "failed to send event");
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}
