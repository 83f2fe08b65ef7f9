//! Pure types for the system-pressure probe. Sampling (via `sysinfo`) lives
//! in the app crate; this module only holds the classification the app
//! crate's sampler feeds through.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Nominal,
    Warning,
    Critical,
}

/// A point-in-time reading of resource availability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu_used_pct: f32,
    pub mem_used_pct: f32,
    pub swap_used_pct: f32,
    pub level: PressureLevel,
    pub can_spawn_worker: bool,
}

impl Capacity {
    /// Fail-open reading used when the platform can't be sampled.
    pub fn nominal_fallback() -> Self {
        Self {
            cpu_used_pct: 0.0,
            mem_used_pct: 0.0,
            swap_used_pct: 0.0,
            level: PressureLevel::Nominal,
            can_spawn_worker: true,
        }
    }
}

const WARNING_CPU_PCT: f32 = 80.0;
const CRITICAL_CPU_PCT: f32 = 95.0;
const WARNING_MEM_PCT: f32 = 80.0;
const CRITICAL_MEM_PCT: f32 = 95.0;
const CRITICAL_SWAP_PCT: f32 = 50.0;

/// Classify a raw utilisation sample into a [`PressureLevel`].
///
/// Critical if CPU or memory is past the critical threshold, or swap usage
/// is heavy (swap use under load is a stronger signal than a borderline CPU
/// reading). Otherwise warning if CPU or memory is past the warning
/// threshold. Otherwise nominal.
pub fn classify(cpu_used_pct: f32, mem_used_pct: f32, swap_used_pct: f32) -> Capacity {
    let level = if cpu_used_pct >= CRITICAL_CPU_PCT
        || mem_used_pct >= CRITICAL_MEM_PCT
        || swap_used_pct >= CRITICAL_SWAP_PCT
    {
        PressureLevel::Critical
    } else if cpu_used_pct >= WARNING_CPU_PCT || mem_used_pct >= WARNING_MEM_PCT {
        PressureLevel::Warning
    } else {
        PressureLevel::Nominal
    };

    Capacity {
        cpu_used_pct,
        mem_used_pct,
        swap_used_pct,
        level,
        can_spawn_worker: level != PressureLevel::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_usage_is_nominal() {
        let c = classify(10.0, 20.0, 0.0);
        assert_eq!(c.level, PressureLevel::Nominal);
        assert!(c.can_spawn_worker);
    }

    #[test]
    fn high_cpu_is_warning() {
        let c = classify(85.0, 20.0, 0.0);
        assert_eq!(c.level, PressureLevel::Warning);
    }

    #[test]
    fn near_saturated_cpu_is_critical() {
        let c = classify(96.0, 20.0, 0.0);
        assert_eq!(c.level, PressureLevel::Critical);
        assert!(!c.can_spawn_worker);
    }

    #[test]
    fn heavy_swap_is_critical_regardless_of_cpu() {
        let c = classify(5.0, 5.0, 60.0);
        assert_eq!(c.level, PressureLevel::Critical);
    }

    #[test]
    fn fallback_is_fail_open() {
        let c = Capacity::nominal_fallback();
        assert_eq!(c.level, PressureLevel::Nominal);
        assert!(c.can_spawn_worker);
    }
}
