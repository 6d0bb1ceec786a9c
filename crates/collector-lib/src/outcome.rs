//! Per-entity outcomes and the cycle report that aggregates them

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an entity was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Unit is not in the running phase
    NotRunning,
    /// Unit lives in the reserved system namespace and is not allow-listed
    SystemNamespace,
    /// No usage snapshots inside the analysis window
    NoData,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotRunning => "not_running",
            SkipReason::SystemNamespace => "system_namespace",
            SkipReason::NoData => "no_data",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged result of processing one unit or sub-unit
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Success,
    Skipped(SkipReason),
    Failed {
        /// Error class, as reported by [`EngineError::kind`]
        kind: &'static str,
        error: String,
    },
}

impl EntityOutcome {
    pub fn failed(error: &EngineError) -> Self {
        EntityOutcome::Failed {
            kind: error.kind(),
            error: error.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityOutcome::Success => "success",
            EntityOutcome::Skipped(_) => "skipped",
            EntityOutcome::Failed { .. } => "failed",
        }
    }
}

/// Outcome tallies for one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: &EntityOutcome) {
        match outcome {
            EntityOutcome::Success => self.succeeded += 1,
            EntityOutcome::Skipped(_) => self.skipped += 1,
            EntityOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Summary of one batch cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Units returned by the source; zero when enumeration failed
    pub units_listed: usize,
    /// Set when enumeration failed; reconciliation was skipped
    pub enumerate_error: Option<String>,
    /// Set when the analyzable sub-units could not be listed
    pub analyze_error: Option<String>,
    pub reconcile: OutcomeCounts,
    pub analyze: OutcomeCounts,
    pub snapshots_recorded: usize,
    pub snapshots_duplicate: usize,
    /// Shutdown was requested before every entity was processed
    pub cancelled: bool,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            units_listed: 0,
            enumerate_error: None,
            analyze_error: None,
            reconcile: OutcomeCounts::default(),
            analyze: OutcomeCounts::default(),
            snapshots_recorded: 0,
            snapshots_duplicate: 0,
            cancelled: false,
        }
    }

    /// True when any entity or either listing step failed
    pub fn has_failures(&self) -> bool {
        self.enumerate_error.is_some()
            || self.analyze_error.is_some()
            || self.reconcile.failed > 0
            || self.analyze.failed > 0
    }
}
