//! Test doubles shared by the engine tests

use crate::error::{SourceError, StoreError, StoreResult};
use crate::models::{
    Analysis, DeclaredResources, NewAnalysis, NewRecommendation, ObservedSubUnit, ObservedUnit,
    Recommendation, ResourceRequestRecord, SubUnitRef, UnitPhase, UsageReading, UsageSnapshot,
    MIB,
};
use crate::source::SampleSource;
use crate::store::{HistoryStore, SqlitePool, SqliteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn running_unit(namespace: &str, name: &str, sub_units: &[&str]) -> ObservedUnit {
    ObservedUnit {
        namespace: namespace.to_string(),
        name: name.to_string(),
        phase: UnitPhase::Running,
        sub_units: sub_units
            .iter()
            .map(|s| ObservedSubUnit {
                name: s.to_string(),
                image: format!("{}:1.0", s),
                resources: DeclaredResources {
                    cpu_request_cores: 1.0,
                    cpu_limit_cores: 2.0,
                    memory_request_bytes: 512 * MIB,
                    memory_limit_bytes: 1024 * MIB,
                },
            })
            .collect(),
    }
}

/// In-memory sample source with scripted failures
#[derive(Default)]
pub struct MockSource {
    units: Vec<ObservedUnit>,
    usage: HashMap<(String, String), Vec<UsageReading>>,
    list_error: Option<String>,
    usage_unavailable: bool,
    delay: Option<Duration>,
    pub list_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
}

impl MockSource {
    pub fn new(units: Vec<ObservedUnit>) -> Self {
        Self {
            units,
            ..Default::default()
        }
    }

    /// Report the same usage for every sub-unit of every unit
    pub fn with_uniform_usage(mut self, cpu_cores: f64, memory_bytes: i64) -> Self {
        for unit in &self.units {
            let readings = unit
                .sub_units
                .iter()
                .map(|s| UsageReading {
                    sub_unit: s.name.clone(),
                    cpu_cores,
                    memory_bytes,
                })
                .collect();
            self.usage
                .insert((unit.namespace.clone(), unit.name.clone()), readings);
        }
        self
    }

    pub fn failing_list(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    pub fn without_usage_backend(mut self) -> Self {
        self.usage_unavailable = true;
        self
    }

    /// Sleep in every usage call, to keep a cycle in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SampleSource for MockSource {
    async fn list_running_units(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ObservedUnit>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.list_error {
            return Err(SourceError::Unavailable(message.clone()));
        }
        Ok(self
            .units
            .iter()
            .filter(|u| namespace.map_or(true, |ns| u.namespace == ns))
            .cloned()
            .collect())
    }

    async fn get_usage(
        &self,
        namespace: &str,
        unit_name: &str,
    ) -> Result<Vec<UsageReading>, SourceError> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.usage_unavailable {
            return Err(SourceError::Unavailable("metrics API not installed".to_string()));
        }
        Ok(self
            .usage
            .get(&(namespace.to_string(), unit_name.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// SQLite store that fails selected operations
pub struct FailingStore {
    pub inner: SqliteStore,
    fail_sub_units: HashSet<String>,
    fail_requests: bool,
    fail_analysis_sub_units: Mutex<HashSet<i64>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::new(SqlitePool::memory().expect("memory pool")),
            fail_sub_units: HashSet::new(),
            fail_requests: false,
            fail_analysis_sub_units: Mutex::new(HashSet::new()),
        }
    }

    /// Upserting a sub-unit with this name fails
    pub fn fail_sub_unit(mut self, name: &str) -> Self {
        self.fail_sub_units.insert(name.to_string());
        self
    }

    /// Every resource request insert fails
    pub fn fail_requests(mut self) -> Self {
        self.fail_requests = true;
        self
    }

    /// Persisting an analysis for this sub-unit id fails
    pub fn fail_analysis_for(&self, sub_unit_id: i64) {
        self.fail_analysis_sub_units.lock().insert(sub_unit_id);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Connection(format!("injected failure: {}", what))
    }
}

#[async_trait]
impl HistoryStore for FailingStore {
    async fn upsert_unit(
        &self,
        namespace: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        self.inner.upsert_unit(namespace, name, now).await
    }

    async fn upsert_sub_unit(
        &self,
        unit_id: i64,
        name: &str,
        image: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        if self.fail_sub_units.contains(name) {
            return Err(Self::injected("upsert_sub_unit"));
        }
        self.inner.upsert_sub_unit(unit_id, name, image, now).await
    }

    async fn insert_resource_request(
        &self,
        sub_unit_id: i64,
        resources: &DeclaredResources,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        if self.fail_requests {
            return Err(Self::injected("insert_resource_request"));
        }
        self.inner
            .insert_resource_request(sub_unit_id, resources, now)
            .await
    }

    async fn insert_snapshot(
        &self,
        sub_unit_id: i64,
        timestamp: DateTime<Utc>,
        cpu_cores: f64,
        memory_bytes: i64,
    ) -> StoreResult<bool> {
        self.inner
            .insert_snapshot(sub_unit_id, timestamp, cpu_cores, memory_bytes)
            .await
    }

    async fn snapshots_since(
        &self,
        sub_unit_id: i64,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageSnapshot>> {
        self.inner.snapshots_since(sub_unit_id, since).await
    }

    async fn latest_resource_request(
        &self,
        sub_unit_id: i64,
    ) -> StoreResult<Option<ResourceRequestRecord>> {
        self.inner.latest_resource_request(sub_unit_id).await
    }

    async fn sub_units_with_snapshots(&self) -> StoreResult<Vec<SubUnitRef>> {
        self.inner.sub_units_with_snapshots().await
    }

    async fn insert_analysis(&self, analysis: &NewAnalysis) -> StoreResult<Analysis> {
        if self
            .fail_analysis_sub_units
            .lock()
            .contains(&analysis.sub_unit_id)
        {
            return Err(Self::injected("insert_analysis"));
        }
        self.inner.insert_analysis(analysis).await
    }

    async fn insert_recommendation(
        &self,
        recommendation: &NewRecommendation,
        now: DateTime<Utc>,
    ) -> StoreResult<Recommendation> {
        self.inner.insert_recommendation(recommendation, now).await
    }
}
