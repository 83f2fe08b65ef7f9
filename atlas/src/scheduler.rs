//! Polling scheduler (§4.B): drives the ingestion orchestrator's periodic
//! rescan on a fixed interval, on top of the event-driven watcher path.
//!
//! Grounded on the background-worker shape used elsewhere in the pack for
//! a spawned tokio task guarded by an `AtomicBool` shutdown flag: a single
//! task owns the interval timer, `stop()` just flips the flag and the task
//! observes it on its next wakeup.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const MIN_INTERVAL_MS: u64 = 10;

type TickFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Runs `tick` on a fixed interval. At most one tick executes at a time: if
/// a tick is still running when the next interval fires, that firing is
/// skipped rather than queued.
pub struct PollingScheduler {
    tick: TickFn,
    interval_ms: AtomicU64,
    shutdown: Arc<AtomicBool>,
    running: Arc<Mutex<()>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn new<F, Fut>(tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            tick: Arc::new(move || Box::pin(tick())),
            interval_ms: AtomicU64::new(0),
            shutdown: Arc::new(AtomicBool::new(true)),
            running: Arc::new(Mutex::new(())),
            handle: Mutex::new(None),
        }
    }

    /// Start ticking every `interval_ms` (clamped to [`MIN_INTERVAL_MS`]).
    /// Restarting resets the shutdown flag, so a scheduler can be
    /// stopped and started repeatedly.
    pub async fn start(self: &Arc<Self>, interval_ms: u64) {
        let interval_ms = interval_ms.max(MIN_INTERVAL_MS);
        self.interval_ms.store(interval_ms, Ordering::SeqCst);
        self.shutdown.store(false, Ordering::SeqCst);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if this.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                this.run_tick_if_idle().await;
            }
        });

        let mut guard = self.handle.lock().await;
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(handle);
    }

    /// Idempotent: suppresses further scheduled ticks. In-flight ticks run
    /// to completion; this does not cancel them.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run a tick immediately, outside the interval cadence. Unlike
    /// scheduled ticks, errors propagate to the caller rather than being
    /// logged and swallowed.
    pub async fn trigger_tick(&self) -> anyhow::Result<()> {
        let _permit = self.running.lock().await;
        (self.tick)().await
    }

    async fn run_tick_if_idle(&self) {
        let permit = match self.running.try_lock() {
            Ok(p) => p,
            Err(_) => {
                debug!("scheduler tick skipped: previous tick still running");
                return;
            }
        };
        if let Err(err) = (self.tick)().await {
            error!(error = %err, "scheduled tick failed");
        }
        drop(permit);
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::SeqCst) {
            warn!("PollingScheduler dropped without calling stop()");
        }
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn ticks_accumulate_while_running() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let scheduler = Arc::new(PollingScheduler::new(move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        scheduler.start(MIN_INTERVAL_MS).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let scheduler = Arc::new(PollingScheduler::new(|| async { Ok(()) }));
        scheduler.start(MIN_INTERVAL_MS).await;
        scheduler.stop();
        scheduler.stop();
    }

    #[tokio::test]
    async fn trigger_tick_propagates_errors() {
        let scheduler = Arc::new(PollingScheduler::new(|| async {
            anyhow::bail!("boom")
        }));
        let result = scheduler.trigger_tick().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn interval_below_floor_is_clamped() {
        let scheduler = Arc::new(PollingScheduler::new(|| async { Ok(()) }));
        scheduler.start(1).await;
        assert_eq!(scheduler.interval_ms.load(Ordering::SeqCst), MIN_INTERVAL_MS);
        scheduler.stop();
    }
}
