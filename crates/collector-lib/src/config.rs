//! Engine tuning shared by every cycle

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Analysis and scheduling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Length of the evaluation window in days (default: 7)
    pub window_days: u32,
    /// Monthly cost of one CPU core (default: 30.0)
    pub cpu_cost_per_core: f64,
    /// Monthly cost of one GiB of memory (default: 10.0)
    pub memory_cost_per_gib: f64,
    /// Entities processed concurrently within a phase (default: 4)
    pub concurrency: usize,
    /// Pause between cycles in continuous mode (default: 5 minutes)
    #[serde(with = "secs")]
    pub collection_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            cpu_cost_per_core: 30.0,
            memory_cost_per_gib: 10.0,
            concurrency: 4,
            collection_interval: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    pub fn window(&self) -> TimeDelta {
        TimeDelta::days(self.window_days as i64)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.window_days == 0 {
            return Err("window_days must be at least 1".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".to_string());
        }
        if self.collection_interval.is_zero() {
            return Err("collection interval must be positive".to_string());
        }
        if !(self.cpu_cost_per_core >= 0.0 && self.memory_cost_per_gib >= 0.0) {
            return Err("costs must be non-negative numbers".to_string());
        }
        Ok(())
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
