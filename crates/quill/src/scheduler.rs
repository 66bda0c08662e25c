//! Debounced persistence scheduling.
//!
//! Rapid edits should not each hit durable storage. [`SaveScheduler`]
//! coalesces them: every [`SaveScheduler::queue`] call cancels the pending
//! timer and starts a fresh one, so the save runs once, a full delay after
//! the most recent request (debounce, not throttle).
//!
//! Cancellation must be race-free: a cancel followed immediately by a new
//! schedule must never let the stale timer fire. Two mechanisms guarantee
//! this - the old task is aborted, and every scheduled task carries a
//! generation number it re-checks after its sleep. Whichever way the race
//! goes, a task whose generation is no longer current does nothing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Delay between the most recent mutation and the durable write.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(3);

/// Coalesces bursts of save requests into a single delayed save.
///
/// Dropping the scheduler cancels any pending save, so no write can fire
/// after its owner is gone.
pub struct SaveScheduler {
    delay: Duration,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl SaveScheduler {
    /// Create a scheduler with the default delay.
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_SAVE_DELAY)
    }

    /// Create a scheduler with a custom delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Schedule `save` to run one delay from now, cancelling any pending
    /// schedule first. Calling again before the delay elapses restarts the
    /// clock.
    ///
    /// Must be called from within a tokio runtime.
    pub fn queue<F>(&mut self, save: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let counter = Arc::clone(&self.generation);
        let delay = self.delay;

        debug!(generation, ?delay, "queuing save");
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // A newer queue() or cancel() has superseded this task.
            if counter.load(Ordering::SeqCst) != generation {
                return;
            }

            save.await;
            debug!(generation, "scheduled save ran");
        }));
    }

    /// Cancel any pending save.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a save is currently scheduled and not yet run.
    pub fn is_pending(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Default for SaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn counting_save(counter: &Arc<AtomicU64>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        // Let woken tasks run to completion.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_queues_one_save() {
        let saves = Arc::new(AtomicU64::new(0));
        let mut scheduler = SaveScheduler::new();

        scheduler.queue(counting_save(&saves));
        settle().await;
        advance(Duration::from_secs(1)).await;
        scheduler.queue(counting_save(&saves));
        settle().await;
        advance(Duration::from_secs(1)).await;
        scheduler.queue(counting_save(&saves));
        settle().await;

        // 2.9s after the last queue: nothing yet.
        advance(Duration::from_millis(2_900)).await;
        settle().await;
        assert_eq!(saves.load(Ordering::SeqCst), 0);

        advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(saves.load(Ordering::SeqCst), 1);

        // And nothing further fires later.
        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_save() {
        let saves = Arc::new(AtomicU64::new(0));
        let mut scheduler = SaveScheduler::new();

        scheduler.queue(counting_save(&saves));
        scheduler.cancel();

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(saves.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_reschedule_fires_once() {
        let saves = Arc::new(AtomicU64::new(0));
        let mut scheduler = SaveScheduler::new();

        scheduler.queue(counting_save(&saves));
        scheduler.cancel();
        scheduler.queue(counting_save(&saves));
        settle().await;

        advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_save() {
        let saves = Arc::new(AtomicU64::new(0));
        {
            let mut scheduler = SaveScheduler::new();
            scheduler.queue(counting_save(&saves));
        }

        advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_delay() {
        let saves = Arc::new(AtomicU64::new(0));
        let mut scheduler = SaveScheduler::with_delay(Duration::from_millis(50));

        scheduler.queue(counting_save(&saves));
        settle().await;
        advance(Duration::from_millis(60)).await;
        settle().await;

        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }
}
