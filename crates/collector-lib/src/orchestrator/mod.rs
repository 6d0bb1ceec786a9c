//! Batch orchestrator
//!
//! One cycle runs Enumerate, then Reconcile for every listed unit, then
//! Analyze for every sub-unit with recorded usage. Entity failures are
//! tallied into the [`CycleReport`]; a cycle never fails as a whole.

mod context;
mod scheduler;

pub use context::CycleContext;
pub use scheduler::{Scheduler, SchedulerBuilder};

use crate::error::EngineError;
use crate::health::{components, HealthRegistry};
use crate::models::{ObservedUnit, SubUnitRef};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::outcome::{CycleReport, EntityOutcome, SkipReason};
use crate::reconcile::{Reconciler, UnitReconciliation};
use crate::recommend::RecommendationEngine;
use crate::source::SampleSource;
use crate::store::HistoryStore;
use chrono::Utc;
use futures::{future, stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of asking for a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    Completed(CycleReport),
    /// Another cycle was in flight; nothing ran
    AlreadyRunning,
}

/// Clears the running flag when the cycle ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Orchestrator {
    source: Arc<dyn SampleSource>,
    store: Arc<dyn HistoryStore>,
    reconciler: Reconciler,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn SampleSource>,
        store: Arc<dyn HistoryStore>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(source.clone(), store.clone()),
            source,
            store,
            health,
            metrics: EngineMetrics::new(),
            logger,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle unless one is already in flight
    ///
    /// Once `shutdown` flips to true no new entity is started; in-flight
    /// entities finish and the report is marked cancelled.
    pub async fn run_cycle(
        &self,
        ctx: &CycleContext,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleStatus {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            info!("Cycle already in progress, skipping");
            return CycleStatus::AlreadyRunning;
        };

        self.logger.log_cycle_start(ctx.namespace.as_deref());
        let mut report = CycleReport::new(ctx.started_at);
        let mut usage_errors = 0usize;

        match self.source.list_running_units(ctx.namespace.as_deref()).await {
            Ok(units) => {
                report.units_listed = units.len();
                usage_errors = self.reconcile_phase(ctx, units, shutdown, &mut report).await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to enumerate units, analyzing existing history");
                report.enumerate_error = Some(e.to_string());
            }
        }

        if !report.cancelled {
            self.analyze_phase(ctx, shutdown, &mut report).await;
        }

        report.finished_at = Utc::now();
        self.update_health(&report, usage_errors).await;
        self.metrics.record_cycle(&report);
        self.logger.log_cycle_complete(&report);

        CycleStatus::Completed(report)
    }

    /// Returns how many units had no usage available
    async fn reconcile_phase(
        &self,
        ctx: &CycleContext,
        units: Vec<ObservedUnit>,
        shutdown: &watch::Receiver<bool>,
        report: &mut CycleReport,
    ) -> usize {
        let total = units.len();
        let now = ctx.started_at;

        let results: Vec<(ObservedUnit, UnitReconciliation)> = stream::iter(units)
            .map(|unit| {
                let reconciler = self.reconciler.clone();
                let cancel = shutdown.clone();
                async move {
                    let cancelled = *cancel.borrow();
                    if cancelled {
                        return None;
                    }
                    let result = reconciler.reconcile(&unit, now).await;
                    Some((unit, result))
                }
            })
            .buffer_unordered(ctx.config.concurrency)
            .filter_map(future::ready)
            .collect()
            .await;

        if results.len() < total {
            report.cancelled = true;
        }

        let mut usage_errors = 0;
        for (unit, result) in &results {
            let entity = format!("{}/{}", unit.namespace, unit.name);
            debug!(
                phase = "reconcile",
                entity = %entity,
                outcome = result.outcome.label(),
                "Entity processed"
            );
            report.reconcile.record(&result.outcome);
            report.snapshots_recorded += result.snapshots_recorded;
            report.snapshots_duplicate += result.snapshots_duplicate;
            if result.usage_error.is_some() {
                usage_errors += 1;
            }
            if let EntityOutcome::Failed { kind, error } = &result.outcome {
                self.logger.log_entity_failure("reconcile", &entity, kind, error);
            }
        }
        usage_errors
    }

    async fn analyze_phase(
        &self,
        ctx: &CycleContext,
        shutdown: &watch::Receiver<bool>,
        report: &mut CycleReport,
    ) {
        let sub_units = match self.store.sub_units_with_snapshots().await {
            Ok(sub_units) => sub_units,
            Err(e) => {
                warn!(error = %e, "Failed to list sub-units for analysis");
                report.analyze_error = Some(e.to_string());
                return;
            }
        };
        let total = sub_units.len();
        debug!(count = total, "Analyzing sub-units");

        let engine = Arc::new(RecommendationEngine::new(
            self.store.clone(),
            ctx.config.clone(),
        ));
        let now = ctx.started_at;

        let outcomes: Vec<(SubUnitRef, EntityOutcome)> = stream::iter(sub_units)
            .map(|sub_unit| {
                let engine = engine.clone();
                let logger = self.logger.clone();
                let cancel = shutdown.clone();
                async move {
                    let cancelled = *cancel.borrow();
                    if cancelled {
                        return None;
                    }
                    let outcome = match engine.analyze(&sub_unit, now).await {
                        Ok(result) => {
                            logger.log_analysis(&result.analysis, &result.recommendation);
                            EntityOutcome::Success
                        }
                        Err(EngineError::NoData) => EntityOutcome::Skipped(SkipReason::NoData),
                        Err(e) => EntityOutcome::failed(&e),
                    };
                    Some((sub_unit, outcome))
                }
            })
            .buffer_unordered(ctx.config.concurrency)
            .filter_map(future::ready)
            .collect()
            .await;

        if outcomes.len() < total {
            report.cancelled = true;
        }

        for (sub_unit, outcome) in &outcomes {
            let entity = format!(
                "{}/{}/{}",
                sub_unit.namespace, sub_unit.unit_name, sub_unit.sub_unit_name
            );
            debug!(
                phase = "analyze",
                entity = %entity,
                outcome = outcome.label(),
                "Entity processed"
            );
            report.analyze.record(outcome);
            if let EntityOutcome::Failed { kind, error } = outcome {
                self.logger.log_entity_failure("analyze", &entity, kind, error);
            }
        }
    }

    async fn update_health(&self, report: &CycleReport, usage_errors: usize) {
        if let Some(error) = &report.enumerate_error {
            self.health
                .set_degraded(components::SAMPLE_SOURCE, format!("Enumeration failed: {}", error))
                .await;
        } else if usage_errors > 0 {
            self.health
                .set_degraded(
                    components::SAMPLE_SOURCE,
                    format!("Usage unavailable for {} units", usage_errors),
                )
                .await;
        } else {
            self.health.set_healthy(components::SAMPLE_SOURCE).await;
        }

        if let Some(error) = &report.analyze_error {
            self.health
                .set_degraded(components::HISTORY_STORE, error.clone())
                .await;
        } else {
            self.health.set_healthy(components::HISTORY_STORE).await;
        }

        if report.has_failures() {
            self.health
                .set_degraded(
                    components::ORCHESTRATOR,
                    format!(
                        "Last cycle had failures: {} reconcile, {} analyze",
                        report.reconcile.failed, report.analyze.failed
                    ),
                )
                .await;
        } else {
            self.health.set_healthy(components::ORCHESTRATOR).await;
        }

        if !report.cancelled {
            self.health.mark_cycle_completed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::health::ComponentStatus;
    use crate::models::MIB;
    use crate::store::{SqlitePool, SqliteStore};
    use crate::testing::{running_unit, FailingStore, MockSource};
    use chrono::{DateTime, Duration, TimeZone};
    use std::time::Duration as StdDuration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn context() -> CycleContext {
        CycleContext::at(now(), Arc::new(EngineConfig::default()), None)
    }

    fn orchestrator(
        source: Arc<dyn SampleSource>,
        store: Arc<dyn HistoryStore>,
    ) -> (Orchestrator, HealthRegistry) {
        let health = HealthRegistry::new();
        let orchestrator =
            Orchestrator::new(source, store, health.clone(), StructuredLogger::new("test"));
        (orchestrator, health)
    }

    fn assert_send<T: Send>(_: &T) {}

    fn completed(status: CycleStatus) -> CycleReport {
        match status {
            CycleStatus::Completed(report) => report,
            CycleStatus::AlreadyRunning => panic!("cycle did not run"),
        }
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let source = Arc::new(
            MockSource::new(vec![
                running_unit("shop", "api-0", &["app"]),
                running_unit("shop", "worker-0", &["app", "sidecar"]),
                running_unit("kube-system", "etcd-master", &["etcd"]),
            ])
            .with_uniform_usage(0.2, 100 * MIB),
        );
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let (orchestrator, health) = orchestrator(source, store);
        let (_tx, shutdown) = watch::channel(false);

        let report = completed(orchestrator.run_cycle(&context(), &shutdown).await);

        assert_eq!(report.units_listed, 3);
        assert_eq!(report.reconcile.succeeded, 2);
        assert_eq!(report.reconcile.skipped, 1);
        assert_eq!(report.snapshots_recorded, 3);
        assert_eq!(report.analyze.succeeded, 3);
        assert!(!report.cancelled);
        assert!(!report.has_failures());
        assert!(!orchestrator.is_running());

        let statuses = health.health().await.components;
        assert_eq!(
            statuses[components::ORCHESTRATOR].status,
            ComponentStatus::Healthy
        );

        health.mark_store_initialized().await;
        assert!(health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_enumerate_failure_still_analyzes_history() {
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let unit_id = store.upsert_unit("shop", "api-0", now()).await.unwrap();
        let sub_unit_id = store
            .upsert_sub_unit(unit_id, "app", "app:1", now())
            .await
            .unwrap();
        store
            .insert_snapshot(sub_unit_id, now() - Duration::hours(1), 0.3, 128 * MIB)
            .await
            .unwrap();

        let source = Arc::new(MockSource::new(vec![]).failing_list("forbidden"));
        let (orchestrator, health) = orchestrator(source, store);
        let (_tx, shutdown) = watch::channel(false);

        let report = completed(orchestrator.run_cycle(&context(), &shutdown).await);

        assert_eq!(report.units_listed, 0);
        assert!(report.enumerate_error.is_some());
        assert_eq!(report.reconcile.total(), 0);
        assert_eq!(report.analyze.succeeded, 1);

        let health = health.health().await;
        assert_eq!(
            health.components[components::SAMPLE_SOURCE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            health.components[components::ORCHESTRATOR].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_stale_history_is_skipped_as_no_data() {
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let unit_id = store.upsert_unit("shop", "api-0", now()).await.unwrap();
        let sub_unit_id = store
            .upsert_sub_unit(unit_id, "app", "app:1", now())
            .await
            .unwrap();
        store
            .insert_snapshot(sub_unit_id, now() - Duration::days(10), 0.3, 128 * MIB)
            .await
            .unwrap();

        let (orchestrator, _health) = orchestrator(Arc::new(MockSource::new(vec![])), store);
        let (_tx, shutdown) = watch::channel(false);

        let report = completed(orchestrator.run_cycle(&context(), &shutdown).await);
        assert_eq!(report.analyze.skipped, 1);
        assert_eq!(report.analyze.succeeded, 0);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_analysis_failure_is_isolated() {
        let source = Arc::new(
            MockSource::new(vec![
                running_unit("shop", "api-0", &["app"]),
                running_unit("shop", "api-1", &["app"]),
            ])
            .with_uniform_usage(0.2, 100 * MIB),
        );
        let store = Arc::new(FailingStore::new());
        // Ids are assigned in insertion order; fail whichever sub-unit lands first
        store.fail_analysis_for(1);

        let (orchestrator, health) = orchestrator(source, store);
        let (_tx, shutdown) = watch::channel(false);

        let report = completed(orchestrator.run_cycle(&context(), &shutdown).await);
        assert_eq!(report.reconcile.succeeded, 2);
        assert_eq!(report.analyze.succeeded, 1);
        assert_eq!(report.analyze.failed, 1);
        assert!(report.has_failures());

        let health = health.health().await;
        assert_eq!(
            health.components[components::ORCHESTRATOR].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_usage_unavailable_degrades_source() {
        let source = Arc::new(
            MockSource::new(vec![running_unit("shop", "api-0", &["app"])]).without_usage_backend(),
        );
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let (orchestrator, health) = orchestrator(source, store);
        let (_tx, shutdown) = watch::channel(false);

        let report = completed(orchestrator.run_cycle(&context(), &shutdown).await);
        assert_eq!(report.reconcile.succeeded, 1);
        assert_eq!(report.snapshots_recorded, 0);
        assert_eq!(report.analyze.total(), 0);

        let health = health.health().await;
        assert_eq!(
            health.components[components::SAMPLE_SOURCE].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_shutdown_starts_no_new_entities() {
        let source = Arc::new(
            MockSource::new(vec![
                running_unit("shop", "api-0", &["app"]),
                running_unit("shop", "api-1", &["app"]),
            ])
            .with_uniform_usage(0.2, 100 * MIB),
        );
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let (orchestrator, health) = orchestrator(source.clone(), store);
        let (_tx, shutdown) = watch::channel(true);

        let report = completed(orchestrator.run_cycle(&context(), &shutdown).await);
        assert!(report.cancelled);
        assert_eq!(report.units_listed, 2);
        assert_eq!(report.reconcile.total(), 0);
        assert_eq!(report.analyze.total(), 0);
        assert_eq!(source.usage_calls.load(Ordering::SeqCst), 0);

        // A cancelled cycle does not count towards readiness
        health.mark_store_initialized().await;
        assert!(!health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_cycle_future_is_send() {
        let source = Arc::new(MockSource::new(vec![running_unit("shop", "api-0", &["app"])]));
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let (orchestrator, _health) = orchestrator(source, store);
        let (_tx, shutdown) = watch::channel(false);
        let ctx = context();

        let cycle = orchestrator.run_cycle(&ctx, &shutdown);
        assert_send(&cycle);
        completed(cycle.await);
    }

    #[tokio::test]
    async fn test_concurrent_cycle_is_skipped() {
        let source = Arc::new(
            MockSource::new(vec![running_unit("shop", "api-0", &["app"])])
                .with_uniform_usage(0.2, 100 * MIB)
                .with_delay(StdDuration::from_millis(300)),
        );
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let (orchestrator, _health) = orchestrator(source.clone(), store);
        let orchestrator = Arc::new(orchestrator);
        let (_tx, shutdown) = watch::channel(false);

        let first = {
            let orchestrator = orchestrator.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { orchestrator.run_cycle(&context(), &shutdown).await })
        };

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(orchestrator.is_running());
        assert_eq!(
            orchestrator.run_cycle(&context(), &shutdown).await,
            CycleStatus::AlreadyRunning
        );

        let report = completed(first.await.unwrap());
        assert_eq!(report.reconcile.succeeded, 1);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_running());
    }
}
