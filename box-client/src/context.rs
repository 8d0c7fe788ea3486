//! Per-operation deadline and cancellation

use crate::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Governs how long an operation waits for its own reply.
///
/// A context never reaches the engine: once a request is submitted it may be
/// evaluated even if the wait is abandoned. For `su` that means the new
/// principal can already be in effect when `Cancelled` or `Timeout` is seen.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Context {
    /// No deadline and no cancellation
    pub fn background() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now; a timeout past the clock's range sets none
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Applies `fallback` only when no deadline was set
    pub(crate) fn or_timeout(&self, fallback: Option<Duration>) -> Self {
        match (self.deadline, fallback) {
            (None, Some(timeout)) => self.clone().with_timeout(timeout),
            _ => self.clone(),
        }
    }

    /// Wait for `fut`, giving up on cancellation or deadline
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TransportError> {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| TransportError::Timeout),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(TransportError::Cancelled),
            out = bounded => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let out = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_cancelled_before_wait() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = Context::background().with_cancellation(token);
        assert!(ctx.is_cancelled());

        // Cancellation wins even over a ready future.
        let out = ctx.run(async { 1 }).await;
        assert_eq!(out, Err(TransportError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let token = CancellationToken::new();
        let ctx = Context::background().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });

        let out = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(TransportError::Cancelled));
        canceller.await.unwrap();
    }

    #[test]
    fn test_fallback_timeout_only_without_deadline() {
        let ctx = Context::background().or_timeout(Some(Duration::from_secs(1)));
        assert!(ctx.deadline().is_some());

        let fixed = Instant::now() + Duration::from_secs(60);
        let ctx = Context::background()
            .with_deadline(fixed)
            .or_timeout(Some(Duration::from_secs(1)));
        assert_eq!(ctx.deadline(), Some(fixed));

        assert!(Context::background().or_timeout(None).deadline().is_none());
    }

    #[tokio::test]
    async fn test_unbounded_timeout() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.run(async { 3 }).await, Ok(3));

        let ctx = Context::background().or_timeout(Some(Duration::MAX));
        assert!(ctx.deadline().is_none());
    }
}
