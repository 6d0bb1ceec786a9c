//! SQLite implementation of the history store

use super::{truncate_to_minute, HistoryStore, SqlitePool};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Analysis, Confidence, DeclaredResources, NewAnalysis, NewRecommendation, Recommendation,
    ResourceRequestRecord, Status, SubUnitRef, UsageSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::trace;

/// SQLite-backed history store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a closure against the connection on the blocking pool
    pub(super) async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.with_connection(f))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Unix-seconds column decoded into a UTC timestamp
pub(super) struct UnixTime(pub DateTime<Utc>);

impl FromSql for UnixTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let secs = value.as_i64()?;
        DateTime::from_timestamp(secs, 0)
            .map(UnixTime)
            .ok_or(FromSqlError::OutOfRange(secs))
    }
}

pub(super) fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(row.get::<_, UnixTime>(idx)?.0)
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Confidence {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Confidence {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

pub(super) const ANALYSIS_COLUMNS: &str = "a.id, a.sub_unit_id, a.analyzed_at, a.window_start, \
     a.window_end, a.avg_cpu, a.max_cpu, a.p95_cpu, a.p99_cpu, a.avg_memory, a.max_memory, \
     a.p95_memory, a.p99_memory, a.current_cpu_request, a.current_mem_request, \
     a.recommended_cpu, a.recommended_memory, a.cpu_waste_percent, a.memory_waste_percent, \
     a.monthly_savings, a.status, a.confidence";

pub(super) fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<Analysis> {
    Ok(Analysis {
        id: row.get(0)?,
        fields: NewAnalysis {
            sub_unit_id: row.get(1)?,
            analyzed_at: get_time(row, 2)?,
            window_start: get_time(row, 3)?,
            window_end: get_time(row, 4)?,
            avg_cpu: row.get(5)?,
            max_cpu: row.get(6)?,
            p95_cpu: row.get(7)?,
            p99_cpu: row.get(8)?,
            avg_memory: row.get(9)?,
            max_memory: row.get(10)?,
            p95_memory: row.get(11)?,
            p99_memory: row.get(12)?,
            current_cpu_request: row.get(13)?,
            current_mem_request: row.get(14)?,
            recommended_cpu: row.get(15)?,
            recommended_memory: row.get(16)?,
            cpu_waste_percent: row.get(17)?,
            memory_waste_percent: row.get(18)?,
            monthly_savings: row.get(19)?,
            status: row.get(20)?,
            confidence: row.get(21)?,
        },
    })
}

pub(super) const RECOMMENDATION_COLUMNS: &str = "id, analysis_id, namespace, unit_name, \
     sub_unit_name, current_cpu, current_memory, recommended_cpu, recommended_memory, \
     monthly_savings, confidence, status, reason, applied, created_at";

pub(super) fn recommendation_from_row(row: &Row<'_>) -> rusqlite::Result<Recommendation> {
    Ok(Recommendation {
        id: row.get(0)?,
        fields: NewRecommendation {
            analysis_id: row.get(1)?,
            namespace: row.get(2)?,
            unit_name: row.get(3)?,
            sub_unit_name: row.get(4)?,
            current_cpu: row.get(5)?,
            current_memory: row.get(6)?,
            recommended_cpu: row.get(7)?,
            recommended_memory: row.get(8)?,
            monthly_savings: row.get(9)?,
            confidence: row.get(10)?,
            status: row.get(11)?,
            reason: row.get(12)?,
        },
        applied: row.get(13)?,
        created_at: get_time(row, 14)?,
    })
}

fn whole_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn upsert_unit(
        &self,
        namespace: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let namespace = namespace.to_string();
        let name = name.to_string();

        self.run(move |conn| {
            let id = conn.query_row(
                "INSERT INTO units (namespace, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(namespace, name) DO UPDATE SET updated_at = excluded.updated_at
                 RETURNING id",
                params![namespace, name, now.timestamp()],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
    }

    async fn upsert_sub_unit(
        &self,
        unit_id: i64,
        name: &str,
        image: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let name = name.to_string();
        let image = image.to_string();

        self.run(move |conn| {
            let id = conn.query_row(
                "INSERT INTO sub_units (unit_id, name, image, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(unit_id, name) DO UPDATE SET
                    image = excluded.image,
                    updated_at = excluded.updated_at
                 RETURNING id",
                params![unit_id, name, image, now.timestamp()],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
    }

    async fn insert_resource_request(
        &self,
        sub_unit_id: i64,
        resources: &DeclaredResources,
        now: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let r = *resources;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO resource_requests
                    (sub_unit_id, cpu_request, cpu_limit, mem_request, mem_limit, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    sub_unit_id,
                    r.cpu_request_cores,
                    r.cpu_limit_cores,
                    r.memory_request_bytes,
                    r.memory_limit_bytes,
                    now.timestamp()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn insert_snapshot(
        &self,
        sub_unit_id: i64,
        timestamp: DateTime<Utc>,
        cpu_cores: f64,
        memory_bytes: i64,
    ) -> StoreResult<bool> {
        let minute = truncate_to_minute(timestamp);

        self.run(move |conn| {
            let changed = conn.execute(
                "INSERT INTO usage_snapshots (sub_unit_id, timestamp, cpu_usage, memory_usage)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(sub_unit_id, timestamp) DO NOTHING",
                params![sub_unit_id, minute.timestamp(), cpu_cores, memory_bytes],
            )?;
            if changed == 0 {
                trace!(sub_unit_id, timestamp = %minute, "Snapshot already recorded for minute");
            }
            Ok(changed > 0)
        })
        .await
    }

    async fn snapshots_since(
        &self,
        sub_unit_id: i64,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageSnapshot>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sub_unit_id, timestamp, cpu_usage, memory_usage
                 FROM usage_snapshots
                 WHERE sub_unit_id = ?1 AND timestamp >= ?2
                 ORDER BY timestamp ASC",
            )?;

            let snapshots = stmt
                .query_map(params![sub_unit_id, since.timestamp()], |row| {
                    Ok(UsageSnapshot {
                        id: row.get(0)?,
                        sub_unit_id: row.get(1)?,
                        timestamp: get_time(row, 2)?,
                        cpu_usage: row.get(3)?,
                        memory_usage: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(snapshots)
        })
        .await
    }

    async fn latest_resource_request(
        &self,
        sub_unit_id: i64,
    ) -> StoreResult<Option<ResourceRequestRecord>> {
        self.run(move |conn| {
            let record = conn
                .query_row(
                    "SELECT id, sub_unit_id, cpu_request, cpu_limit, mem_request, mem_limit,
                            updated_at
                     FROM resource_requests
                     WHERE sub_unit_id = ?1
                     ORDER BY updated_at DESC, id DESC
                     LIMIT 1",
                    [sub_unit_id],
                    |row| {
                        Ok(ResourceRequestRecord {
                            id: row.get(0)?,
                            sub_unit_id: row.get(1)?,
                            resources: DeclaredResources {
                                cpu_request_cores: row.get(2)?,
                                cpu_limit_cores: row.get(3)?,
                                memory_request_bytes: row.get(4)?,
                                memory_limit_bytes: row.get(5)?,
                            },
                            updated_at: get_time(row, 6)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn sub_units_with_snapshots(&self) -> StoreResult<Vec<SubUnitRef>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.unit_id, u.namespace, u.name, s.name
                 FROM sub_units s
                 JOIN units u ON u.id = s.unit_id
                 WHERE EXISTS (SELECT 1 FROM usage_snapshots m WHERE m.sub_unit_id = s.id)
                 ORDER BY s.id",
            )?;

            let refs = stmt
                .query_map([], |row| {
                    Ok(SubUnitRef {
                        id: row.get(0)?,
                        unit_id: row.get(1)?,
                        namespace: row.get(2)?,
                        unit_name: row.get(3)?,
                        sub_unit_name: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(refs)
        })
        .await
    }

    async fn insert_analysis(&self, analysis: &NewAnalysis) -> StoreResult<Analysis> {
        let mut a = analysis.clone();
        a.analyzed_at = whole_seconds(a.analyzed_at);
        a.window_start = whole_seconds(a.window_start);
        a.window_end = whole_seconds(a.window_end);

        self.run(move |conn| {
            let id = conn.query_row(
                "INSERT INTO analyses (
                    sub_unit_id, analyzed_at, window_start, window_end,
                    avg_cpu, max_cpu, p95_cpu, p99_cpu,
                    avg_memory, max_memory, p95_memory, p99_memory,
                    current_cpu_request, current_mem_request,
                    recommended_cpu, recommended_memory,
                    cpu_waste_percent, memory_waste_percent, monthly_savings,
                    status, confidence
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                           ?16, ?17, ?18, ?19, ?20, ?21)
                 RETURNING id",
                params![
                    a.sub_unit_id,
                    a.analyzed_at.timestamp(),
                    a.window_start.timestamp(),
                    a.window_end.timestamp(),
                    a.avg_cpu,
                    a.max_cpu,
                    a.p95_cpu,
                    a.p99_cpu,
                    a.avg_memory,
                    a.max_memory,
                    a.p95_memory,
                    a.p99_memory,
                    a.current_cpu_request,
                    a.current_mem_request,
                    a.recommended_cpu,
                    a.recommended_memory,
                    a.cpu_waste_percent,
                    a.memory_waste_percent,
                    a.monthly_savings,
                    a.status,
                    a.confidence,
                ],
                |row| row.get(0),
            )?;
            Ok(Analysis { id, fields: a })
        })
        .await
    }

    async fn insert_recommendation(
        &self,
        recommendation: &NewRecommendation,
        now: DateTime<Utc>,
    ) -> StoreResult<Recommendation> {
        let r = recommendation.clone();
        let created_at = whole_seconds(now);

        self.run(move |conn| {
            let id = conn.query_row(
                "INSERT INTO recommendations (
                    analysis_id, namespace, unit_name, sub_unit_name,
                    current_cpu, current_memory, recommended_cpu, recommended_memory,
                    monthly_savings, confidence, status, reason, applied, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13)
                 RETURNING id",
                params![
                    r.analysis_id,
                    r.namespace,
                    r.unit_name,
                    r.sub_unit_name,
                    r.current_cpu,
                    r.current_memory,
                    r.recommended_cpu,
                    r.recommended_memory,
                    r.monthly_savings,
                    r.confidence,
                    r.status,
                    r.reason,
                    created_at.timestamp(),
                ],
                |row| row.get(0),
            )?;
            Ok(Recommendation {
                id,
                fields: r,
                applied: false,
                created_at,
            })
        })
        .await
    }
}
