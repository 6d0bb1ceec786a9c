//! Engine library for workload rightsizing
//!
//! This crate provides the core functionality for:
//! - Ingesting running units and their usage from a sample source
//! - Persisting usage history in SQLite
//! - Percentile-based analysis and resource recommendations
//! - Batch orchestration of collection and analysis cycles
//! - The reporting API, health checks and observability

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod outcome;
pub mod reconcile;
pub mod recommend;
pub mod report;
pub mod source;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use error::{EngineError, SourceError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use orchestrator::{CycleContext, CycleStatus, Orchestrator, Scheduler, SchedulerBuilder};
pub use outcome::{CycleReport, EntityOutcome, OutcomeCounts, SkipReason};
