//! Reporting queries over the SQLite history store

use super::sqlite::{
    analysis_from_row, get_time, recommendation_from_row, SqliteStore, UnixTime,
    ANALYSIS_COLUMNS, RECOMMENDATION_COLUMNS,
};
use crate::error::StoreResult;
use crate::models::{
    Recommendation, RecommendationView, Statistics, UnitDetail, UsageHistoryPoint,
};
use crate::report::{
    RecommendationFilter, ReportingStore, SortKey, UnitFilter, HISTORY_LIMIT, SEARCH_LIMIT,
};
use async_trait::async_trait;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Latest analysis per sub-unit; analyses are append-only so the highest id wins
const LATEST: &str =
    "WITH latest AS (SELECT sub_unit_id, MAX(id) AS id FROM analyses GROUP BY sub_unit_id)";

const VIEW_COLUMNS: &str = "SELECT u.namespace, u.name, s.name, a.status, a.cpu_waste_percent, \
     a.memory_waste_percent, a.monthly_savings, a.current_cpu_request, a.current_mem_request, \
     a.recommended_cpu, a.recommended_memory, a.confidence";

const VIEW_JOINS: &str = "FROM latest l \
     JOIN analyses a ON a.id = l.id \
     JOIN sub_units s ON s.id = a.sub_unit_id \
     JOIN units u ON u.id = s.unit_id";

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<RecommendationView> {
    Ok(RecommendationView {
        namespace: row.get(0)?,
        unit_name: row.get(1)?,
        sub_unit_name: row.get(2)?,
        status: row.get(3)?,
        cpu_waste_percent: row.get(4)?,
        memory_waste_percent: row.get(5)?,
        monthly_savings: row.get(6)?,
        current_cpu: row.get(7)?,
        current_memory: row.get(8)?,
        recommended_cpu: row.get(9)?,
        recommended_memory: row.get(10)?,
        confidence: row.get(11)?,
    })
}

fn order_by(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Savings => "a.monthly_savings DESC, u.name ASC, s.name ASC",
        SortKey::Waste => "a.cpu_waste_percent DESC, u.name ASC, s.name ASC",
        SortKey::Name => "u.name ASC, s.name ASC",
    }
}

fn query_views(
    conn: &Connection,
    sql: &str,
    args: &[&dyn ToSql],
) -> StoreResult<Vec<RecommendationView>> {
    let mut stmt = conn.prepare(sql)?;
    let views = stmt
        .query_map(args, view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(views)
}

#[async_trait]
impl ReportingStore for SqliteStore {
    async fn list(&self, filter: &UnitFilter) -> StoreResult<Vec<RecommendationView>> {
        let filter = filter.clone();

        self.run(move |conn| {
            let limit = filter.limit.map(|l| l as i64);
            let mut sql = format!("{} {} {} WHERE 1=1", LATEST, VIEW_COLUMNS, VIEW_JOINS);
            let mut args: Vec<&dyn ToSql> = Vec::new();

            if let Some(namespace) = &filter.namespace {
                sql.push_str(" AND u.namespace = ?");
                args.push(namespace);
            }
            if let Some(status) = &filter.status {
                sql.push_str(" AND a.status = ?");
                args.push(status);
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by(filter.sort));

            if let Some(limit) = &limit {
                sql.push_str(" LIMIT ?");
                args.push(limit);
            }

            query_views(conn, &sql, &args)
        })
        .await
    }

    async fn search(&self, term: &str) -> StoreResult<Vec<RecommendationView>> {
        let pattern = format!("%{}%", term.to_lowercase());

        self.run(move |conn| {
            let sql = format!(
                "{} {} {} WHERE LOWER(u.name) LIKE ?1 OR LOWER(u.namespace) LIKE ?1 \
                 ORDER BY {} LIMIT ?2",
                LATEST,
                VIEW_COLUMNS,
                VIEW_JOINS,
                order_by(SortKey::Savings)
            );
            query_views(conn, &sql, &[&pattern, &(SEARCH_LIMIT as i64)])
        })
        .await
    }

    async fn get(&self, namespace: &str, unit_name: &str) -> StoreResult<Option<UnitDetail>> {
        let namespace = namespace.to_string();
        let unit_name = unit_name.to_string();

        self.run(move |conn| {
            let view_sql = format!(
                "{} {}, a.id {} WHERE u.namespace = ?1 AND u.name = ?2 \
                 ORDER BY s.name ASC LIMIT 1",
                LATEST,
                VIEW_COLUMNS,
                VIEW_JOINS
            );
            let found = conn
                .query_row(&view_sql, params![namespace, unit_name], |row| {
                    Ok((view_from_row(row)?, row.get::<_, i64>(12)?))
                })
                .optional()?;

            let Some((view, analysis_id)) = found else {
                return Ok(None);
            };

            let analysis = conn.query_row(
                &format!("SELECT {} FROM analyses a WHERE a.id = ?1", ANALYSIS_COLUMNS),
                [analysis_id],
                analysis_from_row,
            )?;

            let mut stmt = conn.prepare(
                "SELECT timestamp, cpu_usage, memory_usage
                 FROM usage_snapshots
                 WHERE sub_unit_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT ?2",
            )?;
            let usage_history = stmt
                .query_map(
                    params![analysis.fields.sub_unit_id, HISTORY_LIMIT as i64],
                    |row| {
                        Ok(UsageHistoryPoint {
                            timestamp: get_time(row, 0)?,
                            cpu: row.get(1)?,
                            memory: row.get(2)?,
                        })
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(UnitDetail {
                view,
                analysis,
                usage_history,
            }))
        })
        .await
    }

    async fn list_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> StoreResult<Vec<Recommendation>> {
        let filter = filter.clone();

        self.run(move |conn| {
            let limit = filter.limit.map(|l| l as i64);
            let mut sql =
                format!("SELECT {} FROM recommendations WHERE 1=1", RECOMMENDATION_COLUMNS);
            let mut args: Vec<&dyn ToSql> = Vec::new();

            if let Some(confidence) = &filter.confidence {
                sql.push_str(" AND confidence = ?");
                args.push(confidence);
            }
            if let Some(min_savings) = filter.min_savings.as_ref().filter(|v| **v > 0.0) {
                sql.push_str(" AND monthly_savings >= ?");
                args.push(min_savings);
            }
            sql.push_str(" ORDER BY monthly_savings DESC, id ASC");

            if let Some(limit) = &limit {
                sql.push_str(" LIMIT ?");
                args.push(limit);
            }

            let mut stmt = conn.prepare(&sql)?;
            let recommendations = stmt
                .query_map(args.as_slice(), recommendation_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(recommendations)
        })
        .await
    }

    async fn get_recommendation(&self, id: i64) -> StoreResult<Option<Recommendation>> {
        self.run(move |conn| {
            let rec = conn
                .query_row(
                    &format!("SELECT {} FROM recommendations WHERE id = ?1", RECOMMENDATION_COLUMNS),
                    [id],
                    recommendation_from_row,
                )
                .optional()?;
            Ok(rec)
        })
        .await
    }

    async fn mark_applied(&self, id: i64, applied: bool) -> StoreResult<bool> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE recommendations SET applied = ?1 WHERE id = ?2",
                params![applied, id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn get_statistics(&self) -> StoreResult<Statistics> {
        self.run(|conn| {
            let sql = format!(
                "{} SELECT
                    COUNT(DISTINCT u.id),
                    COUNT(DISTINCT CASE WHEN a.status = 'over-provisioned' THEN u.id END),
                    COUNT(DISTINCT CASE WHEN a.status = 'under-provisioned' THEN u.id END),
                    COUNT(DISTINCT CASE WHEN a.status = 'optimal' THEN u.id END),
                    COALESCE(SUM(a.monthly_savings), 0.0),
                    COALESCE(SUM(CASE WHEN a.status = 'over-provisioned'
                        THEN a.current_cpu_request - a.recommended_cpu
                        ELSE 0.0 END), 0.0),
                    COALESCE(SUM(CASE WHEN a.status = 'over-provisioned'
                        THEN (a.current_mem_request - a.recommended_memory) / 1073741824.0
                        ELSE 0.0 END), 0.0)
                 {}",
                LATEST, VIEW_JOINS
            );

            let mut stats = conn.query_row(&sql, [], |row| {
                Ok(Statistics {
                    total_units: row.get(0)?,
                    over_provisioned: row.get(1)?,
                    under_provisioned: row.get(2)?,
                    optimal: row.get(3)?,
                    total_monthly_savings: row.get(4)?,
                    total_cpu_waste_cores: row.get(5)?,
                    total_memory_waste_gib: row.get(6)?,
                    last_analysis: None,
                    last_collection: None,
                })
            })?;

            stats.last_analysis = conn
                .query_row("SELECT MAX(analyzed_at) FROM analyses", [], |row| {
                    row.get::<_, Option<UnixTime>>(0)
                })?
                .map(|t| t.0);
            stats.last_collection = conn
                .query_row("SELECT MAX(timestamp) FROM usage_snapshots", [], |row| {
                    row.get::<_, Option<UnixTime>>(0)
                })?
                .map(|t| t.0);

            Ok(stats)
        })
        .await
    }

    async fn namespaces(&self) -> StoreResult<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT namespace FROM units ORDER BY namespace")?;
            let namespaces = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(namespaces)
        })
        .await
    }
}
