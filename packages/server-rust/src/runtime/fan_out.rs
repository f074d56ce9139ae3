//! Bounded-concurrency fan-out over independent async operations.
//!
//! Every operation waits for a semaphore permit before it is first polled,
//! so at most `limit` operations are in flight no matter how many are
//! submitted. Results come back in submission order.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use tokio::sync::Semaphore;

/// What to do when one operation in a batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the batch and return the first failure. Operations that have
    /// not finished yet are dropped.
    #[default]
    Propagate,
    /// Record each failure in its slot and keep going.
    Collect,
}

/// Runs batches of operations with a hard concurrency ceiling.
///
/// The permit pool is owned by the instance: sharing one `BoundedFanOut`
/// across concurrent batches bounds them jointly.
#[derive(Debug, Clone)]
pub struct BoundedFanOut {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl BoundedFanOut {
    /// Creates a fan-out allowing `limit` concurrent operations.
    ///
    /// A limit of zero is raised to one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs all operations, failing fast on the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by any operation.
    pub async fn run<I, F, T, E>(&self, operations: I) -> Result<Vec<T>, E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        try_join_all(operations.into_iter().map(|op| self.permitted(op))).await
    }

    /// Runs all operations to completion, capturing failures per item.
    pub async fn run_collect<I, F, T, E>(&self, operations: I) -> Vec<Result<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        join_all(operations.into_iter().map(|op| self.permitted(op))).await
    }

    /// Runs all operations under the given error policy.
    ///
    /// With [`ErrorPolicy::Collect`] this never fails; with
    /// [`ErrorPolicy::Propagate`] every slot of the returned vector is `Ok`.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::Propagate`], returns the first operation error.
    pub async fn run_with_policy<I, F, T, E>(
        &self,
        operations: I,
        policy: ErrorPolicy,
    ) -> Result<Vec<Result<T, E>>, E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        match policy {
            ErrorPolicy::Propagate => Ok(self.run(operations).await?.into_iter().map(Ok).collect()),
            ErrorPolicy::Collect => Ok(self.run_collect(operations).await),
        }
    }

    async fn permitted<F, T, E>(&self, op: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        // The semaphore is never closed, so acquisition only fails if that
        // changes; the operation still runs in that case.
        let _permit = self.semaphore.acquire().await.ok();
        op.await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
