//! Durable history of units, sub-units, usage and analyses
//!
//! The engine talks to storage only through [`HistoryStore`]. The SQLite
//! backend also implements the reporting queries in [`crate::report`].

mod connection;
mod reporting;
mod schema;
mod sqlite;

pub use connection::{SqlitePool, StoreConfig};
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::models::{
    Analysis, DeclaredResources, NewAnalysis, NewRecommendation, Recommendation,
    ResourceRequestRecord, SubUnitRef, UsageSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Read/write contract the engine needs from the history store
///
/// Every call is a single atomic statement; there are no transactions across
/// calls.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert the unit or refresh its `updated_at`; returns the unit id
    async fn upsert_unit(&self, namespace: &str, name: &str, now: DateTime<Utc>)
        -> StoreResult<i64>;

    /// Insert the sub-unit or refresh its image and `updated_at`; returns the sub-unit id
    async fn upsert_sub_unit(
        &self,
        unit_id: i64,
        name: &str,
        image: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i64>;

    /// Append a resource request record
    async fn insert_resource_request(
        &self,
        sub_unit_id: i64,
        resources: &DeclaredResources,
        now: DateTime<Utc>,
    ) -> StoreResult<i64>;

    /// Record usage at the minute containing `timestamp`.
    ///
    /// Returns `false` when a snapshot already exists for that minute; the
    /// later write is dropped.
    async fn insert_snapshot(
        &self,
        sub_unit_id: i64,
        timestamp: DateTime<Utc>,
        cpu_cores: f64,
        memory_bytes: i64,
    ) -> StoreResult<bool>;

    /// Snapshots at or after `since`, oldest first
    async fn snapshots_since(
        &self,
        sub_unit_id: i64,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageSnapshot>>;

    /// Most recently updated resource request record
    async fn latest_resource_request(
        &self,
        sub_unit_id: i64,
    ) -> StoreResult<Option<ResourceRequestRecord>>;

    /// Every sub-unit with at least one usage snapshot
    async fn sub_units_with_snapshots(&self) -> StoreResult<Vec<SubUnitRef>>;

    async fn insert_analysis(&self, analysis: &NewAnalysis) -> StoreResult<Analysis>;

    async fn insert_recommendation(
        &self,
        recommendation: &NewRecommendation,
        now: DateTime<Utc>,
    ) -> StoreResult<Recommendation>;
}

/// Truncate a timestamp to the start of its minute
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}
