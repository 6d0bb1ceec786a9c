//! Core data models for the rightsizer
//!
//! Observation types come from the sample source; record types mirror the
//! rows held by the history store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bytes in one mebibyte
pub const MIB: i64 = 1024 * 1024;

/// Bytes in one gibibyte
pub const GIB: i64 = 1024 * 1024 * 1024;

/// Lifecycle phase of an observed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl UnitPhase {
    /// Map a Kubernetes pod phase string
    pub fn from_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => UnitPhase::Pending,
            Some("Running") => UnitPhase::Running,
            Some("Succeeded") => UnitPhase::Succeeded,
            Some("Failed") => UnitPhase::Failed,
            _ => UnitPhase::Unknown,
        }
    }
}

/// Declared CPU/memory requests and limits; absent declarations are zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredResources {
    pub cpu_request_cores: f64,
    pub cpu_limit_cores: f64,
    pub memory_request_bytes: i64,
    pub memory_limit_bytes: i64,
}

/// A sub-unit (container) as seen by the sample source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedSubUnit {
    pub name: String,
    pub image: String,
    pub resources: DeclaredResources,
}

/// A unit (pod) as seen by the sample source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedUnit {
    pub namespace: String,
    pub name: String,
    pub phase: UnitPhase,
    pub sub_units: Vec<ObservedSubUnit>,
}

/// Point-in-time usage of one sub-unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReading {
    pub sub_unit: String,
    pub cpu_cores: f64,
    pub memory_bytes: i64,
}

/// Sub-unit identity joined with its owning unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubUnitRef {
    pub id: i64,
    pub unit_id: i64,
    pub namespace: String,
    pub unit_name: String,
    pub sub_unit_name: String,
}

/// One stored usage observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub id: i64,
    pub sub_unit_id: i64,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: i64,
}

/// Stored declaration of a sub-unit's requests and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequestRecord {
    pub id: i64,
    pub sub_unit_id: i64,
    pub resources: DeclaredResources,
    pub updated_at: DateTime<Utc>,
}

/// Provisioning verdict for a sub-unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    OverProvisioned,
    UnderProvisioned,
    Optimal,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::OverProvisioned => "over-provisioned",
            Status::UnderProvisioned => "under-provisioned",
            Status::Optimal => "optimal",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "over-provisioned" => Ok(Status::OverProvisioned),
            "under-provisioned" => Ok(Status::UnderProvisioned),
            "optimal" => Ok(Status::Optimal),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Reliability grade of a recommendation, derived from sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(format!("unknown confidence: {}", other)),
        }
    }
}

/// Analysis fields computed by the recommendation engine, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysis {
    pub sub_unit_id: i64,
    pub analyzed_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub avg_cpu: f64,
    pub max_cpu: f64,
    pub p95_cpu: f64,
    pub p99_cpu: f64,
    pub avg_memory: i64,
    pub max_memory: i64,
    pub p95_memory: i64,
    pub p99_memory: i64,
    pub current_cpu_request: f64,
    pub current_mem_request: i64,
    pub recommended_cpu: f64,
    pub recommended_memory: i64,
    pub cpu_waste_percent: f64,
    pub memory_waste_percent: f64,
    pub monthly_savings: f64,
    pub status: Status,
    pub confidence: Confidence,
}

/// A persisted analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    #[serde(flatten)]
    pub fields: NewAnalysis,
}

/// Recommendation fields derived from an analysis, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub analysis_id: i64,
    pub namespace: String,
    pub unit_name: String,
    pub sub_unit_name: String,
    pub current_cpu: f64,
    pub current_memory: i64,
    pub recommended_cpu: f64,
    pub recommended_memory: i64,
    pub monthly_savings: f64,
    pub confidence: Confidence,
    pub status: Status,
    pub reason: String,
}

/// A persisted recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    #[serde(flatten)]
    pub fields: NewRecommendation,
    pub applied: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-sub-unit projection of the latest analysis, used for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationView {
    pub namespace: String,
    pub unit_name: String,
    pub sub_unit_name: String,
    pub status: Status,
    pub cpu_waste_percent: f64,
    pub memory_waste_percent: f64,
    pub monthly_savings: f64,
    pub current_cpu: f64,
    pub current_memory: i64,
    pub recommended_cpu: f64,
    pub recommended_memory: i64,
    pub confidence: Confidence,
}

/// One point of a sub-unit's usage history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: i64,
}

/// Detail view of a unit: projection, latest analysis, recent usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDetail {
    pub view: RecommendationView,
    pub analysis: Analysis,
    pub usage_history: Vec<UsageHistoryPoint>,
}

/// Aggregate counters for the reporting surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_units: i64,
    pub over_provisioned: i64,
    pub under_provisioned: i64,
    pub optimal: i64,
    pub total_monthly_savings: f64,
    pub total_cpu_waste_cores: f64,
    pub total_memory_waste_gib: f64,
    pub last_analysis: Option<DateTime<Utc>>,
    pub last_collection: Option<DateTime<Utc>>,
}
