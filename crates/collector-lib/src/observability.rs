//! Observability infrastructure for the engine
//!
//! Provides:
//! - Prometheus metrics for batch cycles, entity outcomes, snapshots and analyses
//! - Structured JSON logging with tracing

use crate::models::{Analysis, Recommendation};
use crate::outcome::CycleReport;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    cycle_duration_seconds: Histogram,
    entity_outcomes: IntCounterVec,
    snapshots_recorded: IntCounter,
    snapshots_duplicate: IntCounter,
    analyses_produced: IntCounter,
    last_cycle_timestamp: IntGauge,
    units_observed: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "rightsizer_cycle_duration_seconds",
                "Wall time of one collection and analysis cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            entity_outcomes: register_int_counter_vec!(
                "rightsizer_entity_outcomes_total",
                "Per-entity outcomes by cycle phase",
                &["phase", "outcome"]
            )
            .expect("Failed to register entity_outcomes_total"),

            snapshots_recorded: register_int_counter!(
                "rightsizer_snapshots_recorded_total",
                "Usage snapshots written to the history store"
            )
            .expect("Failed to register snapshots_recorded_total"),

            snapshots_duplicate: register_int_counter!(
                "rightsizer_snapshots_duplicate_total",
                "Usage snapshots dropped because the minute was already recorded"
            )
            .expect("Failed to register snapshots_duplicate_total"),

            analyses_produced: register_int_counter!(
                "rightsizer_analyses_produced_total",
                "Analyses persisted by the recommendation engine"
            )
            .expect("Failed to register analyses_produced_total"),

            last_cycle_timestamp: register_int_gauge!(
                "rightsizer_last_cycle_timestamp_seconds",
                "Unix time at which the last cycle finished"
            )
            .expect("Failed to register last_cycle_timestamp_seconds"),

            units_observed: register_int_gauge!(
                "rightsizer_units_observed",
                "Units returned by the sample source in the last cycle"
            )
            .expect("Failed to register units_observed"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a handle, registering the global metrics on first call
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    /// Record everything a finished cycle reports
    pub fn record_cycle(&self, report: &CycleReport) {
        let inner = self.inner();

        let elapsed = (report.finished_at - report.started_at)
            .to_std()
            .unwrap_or_default();
        inner.cycle_duration_seconds.observe(elapsed.as_secs_f64());
        inner.last_cycle_timestamp.set(report.finished_at.timestamp());
        inner.units_observed.set(report.units_listed as i64);

        inner.snapshots_recorded.inc_by(report.snapshots_recorded as u64);
        inner.snapshots_duplicate.inc_by(report.snapshots_duplicate as u64);
        inner.analyses_produced.inc_by(report.analyze.succeeded as u64);

        for (phase, counts) in [("reconcile", &report.reconcile), ("analyze", &report.analyze)] {
            for (outcome, count) in [
                ("success", counts.succeeded),
                ("skipped", counts.skipped),
                ("failed", counts.failed),
            ] {
                inner
                    .entity_outcomes
                    .with_label_values(&[phase, outcome])
                    .inc_by(count as u64);
            }
        }
    }

    /// Text exposition of the default registry
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for engine events
///
/// Emits event-tagged records so cycles and analyses can be followed in the
/// JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, database: &str, mode: &str) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            database = %database,
            mode = %mode,
            "Rightsizer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Rightsizer shutting down"
        );
    }

    pub fn log_cycle_start(&self, namespace: Option<&str>) {
        info!(
            event = "cycle_started",
            instance = %self.instance,
            namespace = namespace.unwrap_or("*"),
            "Starting collection cycle"
        );
    }

    pub fn log_cycle_complete(&self, report: &CycleReport) {
        let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
        if report.has_failures() {
            warn!(
                event = "cycle_completed",
                instance = %self.instance,
                elapsed_ms = elapsed_ms,
                units_listed = report.units_listed,
                enumerate_error = ?report.enumerate_error,
                reconciled = report.reconcile.succeeded,
                reconcile_failed = report.reconcile.failed,
                analyzed = report.analyze.succeeded,
                analyze_skipped = report.analyze.skipped,
                analyze_failed = report.analyze.failed,
                snapshots_recorded = report.snapshots_recorded,
                cancelled = report.cancelled,
                "Collection cycle completed with failures"
            );
        } else {
            info!(
                event = "cycle_completed",
                instance = %self.instance,
                elapsed_ms = elapsed_ms,
                units_listed = report.units_listed,
                reconciled = report.reconcile.succeeded,
                analyzed = report.analyze.succeeded,
                analyze_skipped = report.analyze.skipped,
                snapshots_recorded = report.snapshots_recorded,
                cancelled = report.cancelled,
                "Collection cycle completed"
            );
        }
    }

    pub fn log_analysis(&self, analysis: &Analysis, recommendation: &Recommendation) {
        let rec = &recommendation.fields;
        info!(
            event = "analysis_produced",
            instance = %self.instance,
            namespace = %rec.namespace,
            unit = %rec.unit_name,
            sub_unit = %rec.sub_unit_name,
            analysis_id = analysis.id,
            status = %analysis.fields.status,
            confidence = %analysis.fields.confidence,
            recommended_cpu = analysis.fields.recommended_cpu,
            recommended_memory = analysis.fields.recommended_memory,
            monthly_savings = analysis.fields.monthly_savings,
            "Produced recommendation"
        );
    }

    pub fn log_entity_failure(&self, phase: &str, entity: &str, kind: &str, error: &str) {
        warn!(
            event = "entity_failed",
            instance = %self.instance,
            phase = %phase,
            entity = %entity,
            kind = %kind,
            error = %error,
            "Entity processing failed"
        );
    }
}
