//! Retrying scheduler for long-lived background tasks.
//!
//! A [`RetryingScheduler`] runs one [`ScheduledTask`] forever:
//!
//! 1. Run the task under its own deadline ([`TimeoutGuard`]).
//! 2. On success or timeout, sleep the repeat interval.
//! 3. On failure, sleep the repeat interval plus a randomized backoff drawn
//!    from `[backoff_min, backoff_max]`.
//!
//! The loop has no success exit. It moves from `Running` to `Stopped` only
//! when its cancellation token fires, which is checked before each
//! iteration, during the deadline wait and during the sleep.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::timeout::{GuardError, TimeoutGuard};
use crate::service::config::SchedulerConfig;

// ---------------------------------------------------------------------------
// ScheduledTask
// ---------------------------------------------------------------------------

/// A unit of background work run repeatedly by a [`RetryingScheduler`].
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Name used in log lines and metrics labels.
    fn name(&self) -> &'static str;

    /// Perform one iteration.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`ScheduledTask`].
pub struct FnTask<F> {
    name: &'static str,
    f: F,
}

/// Wraps `f` as a named [`ScheduledTask`].
pub fn task_fn<F, Fut>(name: &'static str, f: F) -> FnTask<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnTask { name, f }
}

#[async_trait]
impl<F, Fut> ScheduledTask for FnTask<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        (self.f)().await
    }
}

// ---------------------------------------------------------------------------
// State and run records
// ---------------------------------------------------------------------------

/// Scheduler lifecycle state.
///
/// State machine: Running -> Stopped (external cancellation only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

impl SchedulerState {
    /// Returns a lowercase label for this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// How one iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Timeout,
    Failed(String),
}

impl RunOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Failed(_) => "error",
        }
    }
}

/// Record of a single iteration. Kept in memory and logged, never persisted.
#[derive(Debug, Clone)]
pub struct TaskRun {
    /// 1-based iteration number.
    pub attempt: u64,
    pub started_at: Instant,
    pub deadline: Duration,
    pub elapsed: Duration,
    pub outcome: RunOutcome,
}

#[derive(Debug, Default)]
struct RunStats {
    attempts: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    last_run: Mutex<Option<TaskRun>>,
}

// ---------------------------------------------------------------------------
// RetryingScheduler
// ---------------------------------------------------------------------------

/// Spawns and supervises the retry loop for one task.
pub struct RetryingScheduler;

impl RetryingScheduler {
    /// Starts running `task` on a new tokio task.
    ///
    /// The loop observes a child of `parent`, so cancelling `parent` (or
    /// calling [`SchedulerHandle::stop`]) stops it.
    #[must_use]
    pub fn spawn(
        task: Arc<dyn ScheduledTask>,
        config: SchedulerConfig,
        parent: &CancellationToken,
    ) -> SchedulerHandle {
        let cancel = parent.child_token();
        let state = Arc::new(ArcSwap::from_pointee(SchedulerState::Running));
        let stats = Arc::new(RunStats::default());

        info!(
            task = task.name(),
            interval_ms = millis(config.repeat_interval),
            deadline_ms = millis(config.task_timeout),
            "scheduler started"
        );

        let handle = tokio::spawn(run_loop(
            task,
            config,
            cancel.clone(),
            Arc::clone(&state),
            Arc::clone(&stats),
        ));

        SchedulerHandle {
            cancel,
            state,
            stats,
            handle: Mutex::new(Some(handle)),
        }
    }
}

async fn run_loop(
    task: Arc<dyn ScheduledTask>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    state: Arc<ArcSwap<SchedulerState>>,
    stats: Arc<RunStats>,
) {
    let name = task.name();
    let guard = TimeoutGuard::new(name, config.task_timeout);

    while !cancel.is_cancelled() {
        let attempt = stats.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Instant::now();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(task = name, attempt, "iteration abandoned on cancellation");
                break;
            }
            result = guard.try_run(task.run()) => result,
        };

        let outcome = match result {
            Ok(()) => RunOutcome::Success,
            Err(GuardError::Timeout { .. }) => RunOutcome::Timeout,
            Err(GuardError::Failed(e)) => RunOutcome::Failed(format!("{e:#}")),
        };
        let elapsed = started_at.elapsed();

        let mut delay = config.repeat_interval;
        match &outcome {
            RunOutcome::Success => {
                debug!(task = name, attempt, elapsed_ms = millis(elapsed), "iteration succeeded");
            }
            RunOutcome::Timeout => {
                stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    task = name,
                    attempt,
                    deadline_ms = millis(config.task_timeout),
                    "iteration timed out"
                );
            }
            RunOutcome::Failed(reason) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                let backoff = jitter(config.backoff_min, config.backoff_max);
                delay += backoff;
                error!(
                    task = name,
                    attempt,
                    error = %reason,
                    backoff_ms = millis(backoff),
                    "iteration failed, backing off"
                );
            }
        }

        metrics::counter!(
            "scheduler_iterations_total",
            "task" => name,
            "outcome" => outcome.as_str()
        )
        .increment(1);

        *stats.last_run.lock() = Some(TaskRun {
            attempt,
            started_at,
            deadline: config.task_timeout,
            elapsed,
            outcome,
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    state.store(Arc::new(SchedulerState::Stopped));
    info!(task = name, "scheduler stopped");
}

/// Uniformly random duration in `[min, max]` at millisecond resolution.
fn jitter(min: Duration, max: Duration) -> Duration {
    let lo = millis(min);
    let hi = millis(max).max(lo);
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

// ---------------------------------------------------------------------------
// SchedulerHandle
// ---------------------------------------------------------------------------

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    state: Arc<ArcSwap<SchedulerState>>,
    stats: Arc<RunStats>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        **self.state.load()
    }

    /// Shared view of the state for health reporting.
    #[must_use]
    pub fn state_handle(&self) -> Arc<ArcSwap<SchedulerState>> {
        Arc::clone(&self.state)
    }

    /// Number of iterations started so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.stats.attempts.load(Ordering::SeqCst)
    }

    /// Number of iterations that failed with an error.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }

    /// Number of iterations that missed their deadline.
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.stats.timeouts.load(Ordering::Relaxed)
    }

    /// The most recently completed iteration, if any.
    #[must_use]
    pub fn last_run(&self) -> Option<TaskRun> {
        self.stats.last_run.lock().clone()
    }

    /// Signals the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signals the loop to stop and waits until it has.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task ended abnormally");
                self.state.store(Arc::new(SchedulerState::Stopped));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
