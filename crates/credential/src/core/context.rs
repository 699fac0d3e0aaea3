//! Request context
//!
//! Carries tracing metadata, an optional deadline and a cancellation token
//! through every engine operation.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{EngineError, EngineResult, ProviderError};

/// Request context for engine operations
///
/// # Examples
///
/// ```
/// use gitlab_secrets_credential::RequestContext;
/// use std::time::Duration;
///
/// let ctx = RequestContext::new().with_deadline(Duration::from_secs(30));
/// assert!(ctx.remaining().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace ID for distributed tracing
    pub trace_id: Uuid,

    /// Timestamp of the request
    pub timestamp: DateTime<Utc>,

    started: Instant,
    deadline: Option<Duration>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with no deadline and a fresh cancellation token
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            started: Instant::now(),
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Bound every awaited call made on behalf of this request
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(budget);
        self
    }

    /// Use a caller-owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set trace ID for this context
    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Apply `budget` only when the caller did not set a deadline
    pub(crate) fn or_deadline(&self, budget: Option<Duration>) -> Self {
        let mut ctx = self.clone();
        if ctx.deadline.is_none() {
            ctx.deadline = budget;
        }
        ctx
    }

    /// Token observed by [`RequestContext::run`]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// True once the caller has cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Time left before the deadline, `None` if unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    /// Await `fut` unless the request is cancelled or its deadline passes first
    pub async fn run<F, T>(&self, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let bounded = async {
            match (self.deadline, self.remaining()) {
                (Some(timeout), Some(remaining)) => {
                    if remaining.is_zero() {
                        return Err(EngineError::DeadlineExceeded { timeout });
                    }
                    tokio::time::timeout(remaining, fut)
                        .await
                        .map_err(|_| EngineError::DeadlineExceeded { timeout })?
                }
                _ => fut.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(EngineError::Cancelled),
            result = bounded => result,
        }
    }

    /// [`run`](Self::run) a provider call, tagging failures with `operation`
    pub async fn call_provider<F, T>(&self, operation: &'static str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.run(async { fut.await.map_err(|e| EngineError::provider(operation, e)) })
            .await
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = RequestContext::new();
        let value = ctx.run(async { Ok::<_, EngineError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_after_cancel_fails_fast() {
        let ctx = RequestContext::new();
        ctx.cancellation().cancel();

        let result = ctx.run(async { Ok::<_, EngineError>(()) }).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_honours_deadline() {
        let ctx = RequestContext::new().with_deadline(Duration::from_millis(50));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, EngineError>(())
            })
            .await;

        assert!(matches!(result, Err(EngineError::DeadlineExceeded { .. })));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let ctx = RequestContext::new();
        let token = ctx.cancellation().clone();

        let handle = tokio::spawn(async move {
            ctx.run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, EngineError>(())
            })
            .await
        });
        token.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_or_deadline_keeps_caller_deadline() {
        let ctx = RequestContext::new().with_deadline(Duration::from_secs(1));
        let merged = ctx.or_deadline(Some(Duration::from_secs(60)));
        assert!(merged.remaining().unwrap() <= Duration::from_secs(1));

        let unbounded = RequestContext::new().or_deadline(None);
        assert!(unbounded.remaining().is_none());
    }
}
