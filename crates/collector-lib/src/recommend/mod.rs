//! Recommendation engine
//!
//! Turns a window of usage snapshots into a persisted analysis and the
//! recommendation derived from it.

pub mod policy;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{Analysis, NewAnalysis, NewRecommendation, Recommendation, SubUnitRef};
use crate::stats::summarize;
use crate::store::HistoryStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Result of analyzing one sub-unit
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis: Analysis,
    pub recommendation: Recommendation,
    pub samples: usize,
}

pub struct RecommendationEngine {
    store: Arc<dyn HistoryStore>,
    config: Arc<EngineConfig>,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn HistoryStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    /// Analyze the window ending at `now`
    ///
    /// Returns [`EngineError::NoData`] without writing anything when the
    /// window holds no snapshots.
    pub async fn analyze(
        &self,
        sub_unit: &SubUnitRef,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, EngineError> {
        let window_start = now - self.config.window();
        let snapshots = self.store.snapshots_since(sub_unit.id, window_start).await?;
        if snapshots.is_empty() {
            return Err(EngineError::NoData);
        }

        let cpu: Vec<f64> = snapshots.iter().map(|s| s.cpu_usage).collect();
        let memory: Vec<i64> = snapshots.iter().map(|s| s.memory_usage).collect();
        let cpu_stats = summarize(&cpu);
        let memory_stats = summarize(&memory);

        let current = self.store.latest_resource_request(sub_unit.id).await?;
        let derived = policy::derive(
            &cpu_stats,
            &memory_stats,
            current.as_ref().map(|r| &r.resources),
            snapshots.len(),
            &self.config,
        );

        debug!(
            sub_unit_id = sub_unit.id,
            samples = snapshots.len(),
            p95_cpu = cpu_stats.p95,
            p95_memory = memory_stats.p95,
            "Computed usage statistics"
        );

        let analysis = self
            .store
            .insert_analysis(&NewAnalysis {
                sub_unit_id: sub_unit.id,
                analyzed_at: now,
                window_start,
                window_end: now,
                avg_cpu: cpu_stats.avg,
                max_cpu: cpu_stats.max,
                p95_cpu: cpu_stats.p95,
                p99_cpu: cpu_stats.p99,
                avg_memory: memory_stats.avg,
                max_memory: memory_stats.max,
                p95_memory: memory_stats.p95,
                p99_memory: memory_stats.p99,
                current_cpu_request: derived.current_cpu,
                current_mem_request: derived.current_memory,
                recommended_cpu: derived.recommended_cpu,
                recommended_memory: derived.recommended_memory,
                cpu_waste_percent: derived.cpu_waste_percent,
                memory_waste_percent: derived.memory_waste_percent,
                monthly_savings: derived.monthly_savings,
                status: derived.status,
                confidence: derived.confidence,
            })
            .await?;

        let recommendation = self
            .store
            .insert_recommendation(
                &NewRecommendation {
                    analysis_id: analysis.id,
                    namespace: sub_unit.namespace.clone(),
                    unit_name: sub_unit.unit_name.clone(),
                    sub_unit_name: sub_unit.sub_unit_name.clone(),
                    current_cpu: derived.current_cpu,
                    current_memory: derived.current_memory,
                    recommended_cpu: derived.recommended_cpu,
                    recommended_memory: derived.recommended_memory,
                    monthly_savings: derived.monthly_savings,
                    confidence: derived.confidence,
                    status: derived.status,
                    reason: policy::reason(
                        snapshots.len(),
                        self.config.window_days,
                        derived.cpu_waste_percent,
                        derived.memory_waste_percent,
                    ),
                },
                now,
            )
            .await?;

        Ok(AnalysisOutcome {
            analysis,
            recommendation,
            samples: snapshots.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, DeclaredResources, Status, MIB};
    use crate::stats::{nearest_rank_index, P95};
    use crate::store::{SqlitePool, SqliteStore};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: Arc<SqliteStore>,
        engine: RecommendationEngine,
        sub_unit: SubUnitRef,
        now: DateTime<Utc>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();

        let unit_id = store.upsert_unit("shop", "api-0", now).await.unwrap();
        let id = store.upsert_sub_unit(unit_id, "app", "img", now).await.unwrap();

        let engine = RecommendationEngine::new(store.clone(), Arc::new(EngineConfig::default()));
        Fixture {
            store,
            engine,
            sub_unit: SubUnitRef {
                id,
                unit_id,
                namespace: "shop".to_string(),
                unit_name: "api-0".to_string(),
                sub_unit_name: "app".to_string(),
            },
            now,
        }
    }

    async fn request(f: &Fixture, cpu: f64, memory: i64) {
        f.store
            .insert_resource_request(
                f.sub_unit.id,
                &DeclaredResources {
                    cpu_request_cores: cpu,
                    memory_request_bytes: memory,
                    ..Default::default()
                },
                f.now,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_high_confidence_over_provisioned() {
        let f = fixture().await;
        request(&f, 1.0, 256 * MIB).await;

        let samples: Vec<f64> = (0..150).map(|i| 0.1 + 0.4 * i as f64 / 149.0).collect();
        for (i, cpu) in samples.iter().enumerate() {
            let ts = f.now - Duration::minutes(5 * (i as i64 + 1));
            f.store
                .insert_snapshot(f.sub_unit.id, ts, *cpu, 200 * MIB)
                .await
                .unwrap();
        }

        let outcome = f.engine.analyze(&f.sub_unit, f.now).await.unwrap();
        let a = &outcome.analysis.fields;

        let mut sorted = samples.clone();
        sorted.sort_by(|x, y| x.total_cmp(y));
        let p95 = sorted[nearest_rank_index(150, P95)];

        assert_eq!(outcome.samples, 150);
        assert_eq!(a.p95_cpu, p95);
        assert_eq!(a.recommended_cpu, p95 * 1.2);
        assert_eq!(a.status, Status::OverProvisioned);
        assert_eq!(a.confidence, Confidence::High);
        assert_eq!(a.window_start, f.now - Duration::days(7));
        assert_eq!(a.current_mem_request, 256 * MIB);
        assert_eq!(a.recommended_memory, 240 * MIB);

        let rec = &outcome.recommendation;
        assert_eq!(rec.fields.analysis_id, outcome.analysis.id);
        assert_eq!(rec.fields.unit_name, "api-0");
        assert!(rec.fields.reason.starts_with("Based on 150 data points over 7 days."));
        assert!(!rec.applied);
    }

    #[tokio::test]
    async fn test_under_provisioned_low_confidence() {
        let f = fixture().await;
        request(&f, 1.0, 256 * MIB).await;

        for i in 0..5 {
            f.store
                .insert_snapshot(f.sub_unit.id, f.now - Duration::hours(i + 1), 2.0, 200 * MIB)
                .await
                .unwrap();
        }

        let outcome = f.engine.analyze(&f.sub_unit, f.now).await.unwrap();
        assert_eq!(outcome.analysis.fields.status, Status::UnderProvisioned);
        assert_eq!(outcome.analysis.fields.confidence, Confidence::Low);
        assert_eq!(outcome.analysis.fields.cpu_waste_percent, -100.0);
    }

    #[tokio::test]
    async fn test_no_snapshots_is_no_data() {
        let f = fixture().await;

        let result = f.engine.analyze(&f.sub_unit, f.now).await;
        assert!(matches!(result, Err(EngineError::NoData)));

        let count: i64 = f
            .store
            .pool()
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM analyses", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_snapshots_outside_window_are_ignored() {
        let f = fixture().await;
        f.store
            .insert_snapshot(f.sub_unit.id, f.now - Duration::days(8), 0.5, 100 * MIB)
            .await
            .unwrap();

        let result = f.engine.analyze(&f.sub_unit, f.now).await;
        assert!(matches!(result, Err(EngineError::NoData)));
    }

    #[tokio::test]
    async fn test_missing_request_uses_defaults() {
        let f = fixture().await;
        f.store
            .insert_snapshot(f.sub_unit.id, f.now - Duration::minutes(1), 0.02, 40 * MIB)
            .await
            .unwrap();

        let outcome = f.engine.analyze(&f.sub_unit, f.now).await.unwrap();
        let a = &outcome.analysis.fields;
        assert_eq!(a.current_cpu_request, policy::DEFAULT_CPU_REQUEST);
        assert_eq!(a.current_mem_request, policy::DEFAULT_MEMORY_REQUEST);
        assert_eq!(a.recommended_memory, 48 * MIB);
    }
}
