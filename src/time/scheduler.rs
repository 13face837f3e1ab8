//! Recurring task scheduling.
//!
//! # Responsibilities
//! - Run a job every `interval` on the tokio runtime
//! - Hand back a cancellable handle per job
//! - Stop every job when the process-wide shutdown fires
//!
//! # Design Decisions
//! - The job is awaited inside the timer loop, so a slow run delays the
//!   next one instead of overlapping it
//! - Missed ticks are skipped, not burst-replayed

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::Shutdown;

/// Spawns recurring jobs, optionally bound to a shutdown coordinator.
#[derive(Clone, Default)]
pub struct Scheduler {
    shutdown: Option<Shutdown>,
}

impl Scheduler {
    /// Scheduler whose jobs only stop when their handle is cancelled.
    pub fn new() -> Self {
        Self { shutdown: None }
    }

    /// Scheduler whose jobs also stop when `shutdown` is triggered.
    pub fn with_shutdown(shutdown: Shutdown) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }

    /// Run `job` every `period`, first run one period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_periodic<F, Fut>(&self, name: impl Into<String>, period: Duration, mut job: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let period = period.max(Duration::from_millis(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut shutdown_rx = self.shutdown.as_ref().map(Shutdown::subscribe);
        let stopped = self.shutdown.as_ref().is_some_and(Shutdown::is_triggered);

        let flag = cancelled.clone();
        let task_name = name.clone();
        let join = tokio::spawn(async move {
            if stopped {
                tracing::debug!(task = %task_name, "Shutdown already triggered, task not started");
                return;
            }
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if flag.load(Ordering::Acquire) {
                            break;
                        }
                        job().await;
                    }
                    _ = wait_for_shutdown(&mut shutdown_rx) => {
                        tracing::debug!(task = %task_name, "Scheduled task received shutdown signal");
                        break;
                    }
                }
            }
        });

        tracing::debug!(task = %name, period_ms = period.as_millis() as u64, "Scheduled recurring task");
        TaskHandle {
            name,
            cancelled,
            join,
        }
    }
}

async fn wait_for_shutdown(rx: &mut Option<broadcast::Receiver<()>>) {
    match rx {
        // Lagged/closed both mean the coordinator is gone or fired.
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handle to a recurring job. Dropping it cancels the job.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop the timer and abort any run in progress.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(task = %self.name, "Cancelling scheduled task");
        }
        self.join.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_job_runs_each_interval() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let handle = Scheduler::new().spawn_periodic("counter", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0, "first run waits one interval");

        time::sleep(Duration::from_secs(26)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        handle.cancel();
        assert!(handle.is_cancelled());
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_does_not_overlap() {
        let active = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        let (a, m) = (active.clone(), max_seen.clone());
        let _handle = Scheduler::new().spawn_periodic("slow", Duration::from_secs(1), move || {
            let (a, m) = (a.clone(), m.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                time::sleep(Duration::from_secs(3)).await;
                a.fetch_sub(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_jobs() {
        let shutdown = Shutdown::new();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let handle = Scheduler::with_shutdown(shutdown.clone()).spawn_periodic("bound", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(1500)).await;
        shutdown.trigger();
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        drop(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_spawned_after_shutdown_never_runs() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let _handle = Scheduler::with_shutdown(shutdown).spawn_periodic("late", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
