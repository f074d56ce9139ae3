//! Deadline enforcement for single async operations.
//!
//! [`TimeoutGuard::run`] never returns an error: a missed deadline is logged
//! at `warn`, any other failure at `error`, and both collapse to `None`.
//! [`TimeoutGuard::try_run`] keeps the distinction for callers (the
//! scheduler) that react differently to timeouts and failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, trace, warn};

// ---------------------------------------------------------------------------
// GuardError
// ---------------------------------------------------------------------------

/// Outcome of a guarded operation that did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    #[error("{label} timed out after {}ms", .deadline.as_millis())]
    Timeout {
        label: &'static str,
        deadline: Duration,
    },
    #[error("{0}")]
    Failed(E),
}

impl<E> GuardError<E> {
    /// Returns `true` for a missed deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// TimeoutGuard
// ---------------------------------------------------------------------------

/// Runs one operation under a deadline, tagged with a label for logging.
///
/// Cancellation on timeout is soft: the operation's future is dropped, but
/// any work it already handed off elsewhere (a spawned task, a request on
/// the wire) is not recalled.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    label: &'static str,
    deadline: Duration,
}

impl TimeoutGuard {
    #[must_use]
    pub fn new(label: &'static str, deadline: Duration) -> Self {
        Self { label, deadline }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Awaits `fut` for at most the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Timeout`] when the deadline elapses first and
    /// [`GuardError::Failed`] when the operation itself fails. Nothing is
    /// logged; that is left to the caller.
    pub async fn try_run<F, T, E>(&self, fut: F) -> Result<T, GuardError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(GuardError::Failed(e)),
            Err(_elapsed) => Err(GuardError::Timeout {
                label: self.label,
                deadline: self.deadline,
            }),
        }
    }

    /// Awaits `fut` for at most the deadline, absorbing every failure.
    ///
    /// Returns `None` on timeout or error, after logging it.
    pub async fn run<F, T, E>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match self.try_run(fut).await {
            Ok(value) => {
                trace!(label = self.label, "guarded operation completed");
                Some(value)
            }
            Err(GuardError::Timeout { label, deadline }) => {
                #[allow(clippy::cast_possible_truncation)]
                let deadline_ms = deadline.as_millis() as u64;
                warn!(label, deadline_ms, "timed out waiting for operation");
                None
            }
            Err(GuardError::Failed(e)) => {
                error!(label = self.label, error = %e, "operation failed");
                None
            }
        }
    }
}

/// Convenience wrapper: `TimeoutGuard::new(label, deadline).run(fut)`.
pub async fn run_with_timeout<F, T, E>(fut: F, deadline: Duration, label: &'static str) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    TimeoutGuard::new(label, deadline).run(fut).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn slow(delay_ms: u64) -> Result<u32, String> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(7)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_deadline() {
        let value = run_with_timeout(slow(10), Duration::from_millis(1000), "fast").await;
        assert_eq!(value, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn missed_deadline_returns_none() {
        let value = run_with_timeout(slow(200), Duration::from_millis(50), "slow").await;
        assert_eq!(value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_operation_returns_none() {
        let pending = std::future::pending::<Result<u32, String>>();
        let value = run_with_timeout(pending, Duration::from_secs(5), "hung").await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn operation_error_returns_none() {
        let failing = async { Err::<u32, _>("connection reset".to_string()) };
        let value = run_with_timeout(failing, Duration::from_secs(1), "failing").await;
        assert_eq!(value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn try_run_distinguishes_timeout_from_failure() {
        let guard = TimeoutGuard::new("lookup", Duration::from_millis(50));

        let err = guard.try_run(slow(200)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "lookup timed out after 50ms");

        let err = guard
            .try_run(async { Err::<u32, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Failed(ref msg) if msg == "boom"));
    }
}
