//! Ingestion reconciler
//!
//! Brings the history store in line with one observed unit: identities are
//! upserted, a request record is appended per sub-unit, and a usage snapshot
//! is written for the current minute when the source has a reading.

use crate::error::{EngineError, SourceError, StoreResult};
use crate::models::{ObservedSubUnit, ObservedUnit, UsageReading};
use crate::outcome::EntityOutcome;
use crate::source::{ineligibility, SampleSource};
use crate::store::HistoryStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of reconciling one unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReconciliation {
    pub outcome: EntityOutcome,
    pub sub_units_failed: usize,
    pub snapshots_recorded: usize,
    pub snapshots_duplicate: usize,
    /// Set when the usage fetch failed; the unit was ingested without snapshots
    pub usage_error: Option<String>,
}

impl UnitReconciliation {
    fn with_outcome(outcome: EntityOutcome) -> Self {
        Self {
            outcome,
            sub_units_failed: 0,
            snapshots_recorded: 0,
            snapshots_duplicate: 0,
            usage_error: None,
        }
    }
}

enum SnapshotWrite {
    Recorded,
    Duplicate,
    NoReading,
}

#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn SampleSource>,
    store: Arc<dyn HistoryStore>,
}

impl Reconciler {
    pub fn new(source: Arc<dyn SampleSource>, store: Arc<dyn HistoryStore>) -> Self {
        Self { source, store }
    }

    /// Reconcile one unit at `now`
    ///
    /// Never returns an error: failures are reported through the outcome.
    /// The unit fails only when its own row cannot be written or when every
    /// sub-unit failed.
    pub async fn reconcile(&self, unit: &ObservedUnit, now: DateTime<Utc>) -> UnitReconciliation {
        if let Some(reason) = ineligibility(unit) {
            debug!(
                namespace = %unit.namespace,
                unit = %unit.name,
                reason = %reason,
                "Skipping unit"
            );
            return UnitReconciliation::with_outcome(EntityOutcome::Skipped(reason));
        }

        let unit_id = match self.store.upsert_unit(&unit.namespace, &unit.name, now).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    namespace = %unit.namespace,
                    unit = %unit.name,
                    error = %e,
                    "Failed to upsert unit"
                );
                let error = EngineError::from(e);
                return UnitReconciliation::with_outcome(EntityOutcome::failed(&error));
            }
        };

        let mut result = UnitReconciliation::with_outcome(EntityOutcome::Success);
        let mut last_error = None;

        let readings = match self.source.get_usage(&unit.namespace, &unit.name).await {
            Ok(readings) => readings,
            Err(e) => {
                log_usage_error(unit, &e);
                result.usage_error = Some(e.to_string());
                Vec::new()
            }
        };
        let by_name: HashMap<&str, &UsageReading> =
            readings.iter().map(|r| (r.sub_unit.as_str(), r)).collect();

        for sub_unit in &unit.sub_units {
            let reading = by_name.get(sub_unit.name.as_str()).copied();
            match self.reconcile_sub_unit(unit_id, unit, sub_unit, reading, now).await {
                Ok(SnapshotWrite::Recorded) => result.snapshots_recorded += 1,
                Ok(SnapshotWrite::Duplicate) => result.snapshots_duplicate += 1,
                Ok(SnapshotWrite::NoReading) => {}
                Err(e) => {
                    warn!(
                        namespace = %unit.namespace,
                        unit = %unit.name,
                        sub_unit = %sub_unit.name,
                        error = %e,
                        "Failed to reconcile sub-unit"
                    );
                    result.sub_units_failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if result.sub_units_failed == unit.sub_units.len() {
            if let Some(e) = last_error {
                let error = EngineError::from(e);
                result.outcome = EntityOutcome::Failed {
                    kind: error.kind(),
                    error: format!("all {} sub-units failed: {}", result.sub_units_failed, error),
                };
            }
        }

        result
    }

    async fn reconcile_sub_unit(
        &self,
        unit_id: i64,
        unit: &ObservedUnit,
        sub_unit: &ObservedSubUnit,
        reading: Option<&UsageReading>,
        now: DateTime<Utc>,
    ) -> StoreResult<SnapshotWrite> {
        let sub_unit_id = self
            .store
            .upsert_sub_unit(unit_id, &sub_unit.name, &sub_unit.image, now)
            .await?;

        if let Err(e) = self
            .store
            .insert_resource_request(sub_unit_id, &sub_unit.resources, now)
            .await
        {
            warn!(
                namespace = %unit.namespace,
                unit = %unit.name,
                sub_unit = %sub_unit.name,
                error = %e,
                "Failed to record resource requests"
            );
        }

        let Some(reading) = reading else {
            return Ok(SnapshotWrite::NoReading);
        };

        let inserted = self
            .store
            .insert_snapshot(sub_unit_id, now, reading.cpu_cores, reading.memory_bytes)
            .await?;

        Ok(if inserted {
            SnapshotWrite::Recorded
        } else {
            SnapshotWrite::Duplicate
        })
    }
}

fn log_usage_error(unit: &ObservedUnit, error: &SourceError) {
    match error {
        SourceError::Unavailable(_) => debug!(
            namespace = %unit.namespace,
            unit = %unit.name,
            error = %error,
            "Usage unavailable, ingesting without snapshots"
        ),
        _ => warn!(
            namespace = %unit.namespace,
            unit = %unit.name,
            error = %error,
            "Failed to fetch usage, ingesting without snapshots"
        ),
    }
}
