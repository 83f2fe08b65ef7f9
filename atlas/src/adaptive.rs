//! Adaptive parallel stage (§4.C): a streaming transform whose concurrency
//! tracks system pressure.
//!
//! Built from `futures::stream::FuturesUnordered` driving `tokio::spawn`ed
//! tasks, gated by an atomic concurrency target a background monitor task
//! updates every `monitor_ms`. Results are emitted in completion order, not
//! source order. The internal queue never holds more than the *current*
//! concurrency's worth of in-flight work — there is no unbounded look-ahead
//! buffering — and no item is ever dropped across a concurrency change:
//! tasks already spawned run to completion regardless of later adjustments.
//!
//! Dropping the returned stream stops pulling new items from `source`
//! ("pending spawns" are cancelled) and stops the monitor task, but any
//! task already handed to `tokio::spawn` keeps running to completion in the
//! background rather than being aborted.

use crate::pressure::PressureProbe;
use atlas_core::pressure::PressureLevel;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveParams {
    pub initial: usize,
    pub min: usize,
    pub max: usize,
    pub monitor_ms: u64,
}

struct MonitorGuard(tokio::task::JoinHandle<()>);

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `f` over `source` with concurrency adapted to system pressure every
/// `params.monitor_ms`. Concurrency starts at `clamp(initial, min, max)`.
pub fn adaptive_parallel<S, T, F, Fut, R>(
    mut source: S,
    f: F,
    params: AdaptiveParams,
    probe: Arc<dyn PressureProbe>,
) -> impl Stream<Item = R>
where
    S: Stream<Item = T> + Send + Unpin + 'static,
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let min = params.min.max(1);
    let max = params.max.max(min);
    let initial = params.initial.clamp(min, max);
    let monitor_ms = params.monitor_ms.max(1);

    let limit = Arc::new(AtomicUsize::new(initial));
    let f = Arc::new(f);

    let monitor_limit = Arc::clone(&limit);
    let monitor_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(monitor_ms));
        ticker.tick().await; // first tick fires immediately; skip it, we already set `initial`
        loop {
            ticker.tick().await;
            let capacity = probe.assess();
            let current = monitor_limit.load(Ordering::SeqCst);
            let next = match capacity.level {
                PressureLevel::Critical => min,
                PressureLevel::Warning => (((current as f64) * 0.7).floor() as usize).max(min),
                PressureLevel::Nominal => (current + 1).min(max),
            };
            let next = next.clamp(min, max);
            if next != current {
                debug!(from = current, to = next, level = ?capacity.level, "adaptive concurrency adjusted");
            }
            monitor_limit.store(next, Ordering::SeqCst);
        }
    });

    let (tx, rx) = mpsc::channel::<R>(1);
    tokio::spawn(async move {
        let _monitor_guard = MonitorGuard(monitor_handle);
        let mut in_flight: FuturesUnordered<tokio::task::JoinHandle<R>> = FuturesUnordered::new();

        'drive: loop {
            let cap = limit.load(Ordering::SeqCst).max(1);
            tokio::select! {
                biased;

                Some(join_result) = in_flight.next(), if !in_flight.is_empty() => {
                    match join_result {
                        Ok(result) => {
                            if tx.send(result).await.is_err() {
                                break 'drive;
                            }
                        }
                        Err(err) => trace!(error = %err, "adaptive task panicked or was cancelled"),
                    }
                }

                maybe_item = source.next(), if in_flight.len() < cap => {
                    match maybe_item {
                        Some(item) => {
                            let fut = f(item);
                            in_flight.push(tokio::spawn(fut));
                        }
                        None => {
                            // Source exhausted: drain remaining in-flight work,
                            // ignoring the concurrency cap, then stop.
                            while let Some(join_result) = in_flight.next().await {
                                if let Ok(result) = join_result {
                                    if tx.send(result).await.is_err() {
                                        break 'drive;
                                    }
                                }
                            }
                            break 'drive;
                        }
                    }
                }

                else => {
                    if in_flight.is_empty() {
                        break 'drive;
                    }
                }
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pressure::PressureProbe;
    use atlas_core::pressure::Capacity;
    use futures::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};

    struct ConstantProbe(PressureLevel);

    impl PressureProbe for ConstantProbe {
        fn assess(&self) -> Capacity {
            atlas_core::pressure::classify(
                match self.0 {
                    PressureLevel::Nominal => 10.0,
                    PressureLevel::Warning => 85.0,
                    PressureLevel::Critical => 99.0,
                },
                10.0,
                0.0,
            )
        }
    }

    #[tokio::test]
    async fn every_item_is_processed_exactly_once() {
        let items: Vec<u32> = (0..50).collect();
        let source = stream::iter(items.clone());
        let probe = Arc::new(ConstantProbe(PressureLevel::Nominal));
        let params = AdaptiveParams {
            initial: 4,
            min: 1,
            max: 8,
            monitor_ms: 5_000,
        };

        let out: Vec<u32> = adaptive_parallel(source, |x| async move { x * 2 }, params, probe)
            .collect()
            .await;

        let mut sorted = out.clone();
        sorted.sort_unstable();
        let expected: Vec<u32> = items.iter().map(|x| x * 2).collect();
        assert_eq!(sorted, expected);
    }

    #[tokio::test]
    async fn empty_source_yields_empty_stream() {
        let source = stream::iter(Vec::<u32>::new());
        let probe = Arc::new(ConstantProbe(PressureLevel::Nominal));
        let params = AdaptiveParams {
            initial: 2,
            min: 1,
            max: 4,
            monitor_ms: 5_000,
        };
        let out: Vec<u32> = adaptive_parallel(source, |x| async move { x }, params, probe)
            .collect()
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn critical_pressure_does_not_stall_progress() {
        let counter = Arc::new(AtomicU8::new(0));
        let items: Vec<u32> = (0..10).collect();
        let source = stream::iter(items);
        let probe = Arc::new(ConstantProbe(PressureLevel::Critical));
        let params = AdaptiveParams {
            initial: 4,
            min: 1,
            max: 8,
            monitor_ms: 5_000,
        };
        let c = Arc::clone(&counter);
        let out: Vec<u32> = adaptive_parallel(
            source,
            move |x| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, AtomicOrdering::SeqCst);
                    x
                }
            },
            params,
            probe,
        )
        .collect()
        .await;
        assert_eq!(out.len(), 10);
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 10);
    }
}
