//! Right-sizing rules
//!
//! Pure functions from windowed statistics and declared requests to a
//! recommendation. No I/O.

use crate::config::EngineConfig;
use crate::models::{Confidence, DeclaredResources, Status, GIB, MIB};
use crate::stats::Summary;

/// Multiplier applied to p95 usage
pub const HEADROOM: f64 = 1.2;

pub const MIN_CPU_CORES: f64 = 0.01;
pub const MIN_MEMORY_BYTES: i64 = 32 * MIB;

/// Assumed request when a sub-unit has no stored request record
pub const DEFAULT_CPU_REQUEST: f64 = 0.1;
pub const DEFAULT_MEMORY_REQUEST: i64 = 128 * MIB;

/// Waste strictly above this marks the sub-unit over-provisioned
pub const OVER_PROVISIONED_WASTE: f64 = 30.0;
/// Waste strictly below this marks the sub-unit under-provisioned
pub const UNDER_PROVISIONED_WASTE: f64 = -20.0;

const MIN_WASTE: f64 = -100.0;

pub const HIGH_CONFIDENCE_SAMPLES: usize = 100;
pub const MEDIUM_CONFIDENCE_SAMPLES: usize = 20;

pub fn recommended_cpu(p95: f64) -> f64 {
    (p95 * HEADROOM).max(MIN_CPU_CORES)
}

/// Truncates toward zero before applying the floor
pub fn recommended_memory(p95: i64) -> i64 {
    ((p95 as f64 * HEADROOM) as i64).max(MIN_MEMORY_BYTES)
}

/// Percentage of `current` that `recommended` would release; 0 when nothing is requested
pub fn waste_percent(current: f64, recommended: f64) -> f64 {
    if current == 0.0 {
        return 0.0;
    }
    ((current - recommended) / current * 100.0).max(MIN_WASTE)
}

pub fn classify_status(cpu_waste: f64, memory_waste: f64) -> Status {
    if cpu_waste > OVER_PROVISIONED_WASTE || memory_waste > OVER_PROVISIONED_WASTE {
        Status::OverProvisioned
    } else if cpu_waste < UNDER_PROVISIONED_WASTE || memory_waste < UNDER_PROVISIONED_WASTE {
        Status::UnderProvisioned
    } else {
        Status::Optimal
    }
}

pub fn classify_confidence(samples: usize) -> Confidence {
    if samples >= HIGH_CONFIDENCE_SAMPLES {
        Confidence::High
    } else if samples >= MEDIUM_CONFIDENCE_SAMPLES {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Values derived for one sub-unit
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub current_cpu: f64,
    pub current_memory: i64,
    pub recommended_cpu: f64,
    pub recommended_memory: i64,
    pub cpu_waste_percent: f64,
    pub memory_waste_percent: f64,
    pub monthly_savings: f64,
    pub status: Status,
    pub confidence: Confidence,
}

/// Derive a recommendation from usage statistics and the current request
///
/// Only dimensions with positive waste contribute to savings, and the total
/// never goes negative.
pub fn derive(
    cpu: &Summary<f64>,
    memory: &Summary<i64>,
    current: Option<&DeclaredResources>,
    samples: usize,
    config: &EngineConfig,
) -> Derivation {
    let (current_cpu, current_memory) = match current {
        Some(r) => (r.cpu_request_cores, r.memory_request_bytes),
        None => (DEFAULT_CPU_REQUEST, DEFAULT_MEMORY_REQUEST),
    };

    let recommended_cpu = recommended_cpu(cpu.p95);
    let recommended_memory = recommended_memory(memory.p95);

    let cpu_waste_percent = waste_percent(current_cpu, recommended_cpu);
    let memory_waste_percent = waste_percent(current_memory as f64, recommended_memory as f64);

    let mut monthly_savings = 0.0;
    if cpu_waste_percent > 0.0 {
        monthly_savings += (current_cpu - recommended_cpu) * config.cpu_cost_per_core;
    }
    if memory_waste_percent > 0.0 {
        monthly_savings +=
            (current_memory - recommended_memory) as f64 / GIB as f64 * config.memory_cost_per_gib;
    }

    Derivation {
        current_cpu,
        current_memory,
        recommended_cpu,
        recommended_memory,
        cpu_waste_percent,
        memory_waste_percent,
        monthly_savings: monthly_savings.max(0.0),
        status: classify_status(cpu_waste_percent, memory_waste_percent),
        confidence: classify_confidence(samples),
    }
}

/// Human-readable justification stored with a recommendation
pub fn reason(samples: usize, window_days: u32, cpu_waste: f64, memory_waste: f64) -> String {
    format!(
        "Based on {} data points over {} days. CPU waste: {:.1}%, Memory waste: {:.1}%",
        samples, window_days, cpu_waste, memory_waste
    )
}
