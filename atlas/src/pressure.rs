//! System-pressure probe (§4.A). Samples CPU/memory/swap via `sysinfo` and
//! classifies the reading with [`atlas_core::pressure::classify`], guarded
//! by a ~1s TTL cache so a burst of callers doesn't storm the OS.

use atlas_core::pressure::Capacity;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::Mutex as AsyncMutex;

const CACHE_TTL: Duration = Duration::from_millis(1000);

/// Fail-open on any platform where sampling can't be trusted.
pub trait PressureProbe: Send + Sync {
    fn assess(&self) -> Capacity;
}

pub struct SysinfoPressureProbe {
    system: AsyncMutex<System>,
    cache: Mutex<Option<(Instant, Capacity)>>,
}

impl SysinfoPressureProbe {
    pub fn new() -> Self {
        Self {
            system: AsyncMutex::new(System::new_all()),
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<Capacity> {
        let guard = self.cache.lock().expect("pressure cache poisoned");
        guard.and_then(|(at, cap)| {
            if at.elapsed() < CACHE_TTL {
                Some(cap)
            } else {
                None
            }
        })
    }

    fn store(&self, cap: Capacity) {
        let mut guard = self.cache.lock().expect("pressure cache poisoned");
        *guard = Some((Instant::now(), cap));
    }

    /// Sample fresh utilisation figures. Blocking under the hood (`sysinfo`
    /// has no async API); callers on the async path should go through
    /// [`PressureProbe::assess`] which is cheap once the TTL cache is warm,
    /// or wrap a cache miss in `spawn_blocking` if called from a hot loop.
    fn sample(&self) -> Capacity {
        let mut system = match self.system.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Capacity::nominal_fallback(),
        };
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_used_pct = system.global_cpu_usage();
        let total_mem = system.total_memory();
        let used_mem = system.used_memory();
        let mem_used_pct = if total_mem == 0 {
            0.0
        } else {
            (used_mem as f64 / total_mem as f64 * 100.0) as f32
        };
        let total_swap = system.total_swap();
        let used_swap = system.used_swap();
        let swap_used_pct = if total_swap == 0 {
            0.0
        } else {
            (used_swap as f64 / total_swap as f64 * 100.0) as f32
        };

        atlas_core::pressure::classify(cpu_used_pct, mem_used_pct, swap_used_pct)
    }
}

impl Default for SysinfoPressureProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PressureProbe for SysinfoPressureProbe {
    fn assess(&self) -> Capacity {
        if let Some(cap) = self.cached() {
            return cap;
        }
        let cap = self.sample();
        self.store(cap);
        cap
    }
}

/// Fail-open stub used when `sysinfo` can't be relied on (unsupported
/// platform, sandboxed environment) — always reports nominal pressure and
/// allows spawning workers.
pub struct FailOpenProbe;

impl PressureProbe for FailOpenProbe {
    fn assess(&self) -> Capacity {
        Capacity::nominal_fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_open_probe_is_always_nominal() {
        let cap = FailOpenProbe.assess();
        assert!(cap.can_spawn_worker);
    }

    #[test]
    fn sysinfo_probe_caches_within_ttl() {
        let probe = SysinfoPressureProbe::new();
        let a = probe.assess();
        let b = probe.assess();
        assert_eq!(a, b);
    }
}
