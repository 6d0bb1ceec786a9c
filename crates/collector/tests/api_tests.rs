//! Integration tests for the reporting API and health endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use collector_lib::{
    api::{create_router, AppState},
    config::EngineConfig,
    health::{components, HealthRegistry},
    models::{DeclaredResources, MIB},
    observability::EngineMetrics,
    recommend::RecommendationEngine,
    store::{HistoryStore, SqlitePool, SqliteStore},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Record `samples` of usage for one sub-unit and analyze it
async fn seed_unit(
    store: &Arc<SqliteStore>,
    namespace: &str,
    unit: &str,
    requests: (f64, i64),
    usage: (f64, i64),
    samples: i64,
) {
    let now = Utc::now();
    let unit_id = store.upsert_unit(namespace, unit, now).await.unwrap();
    let sub_unit_id = store
        .upsert_sub_unit(unit_id, "app", "registry.local/app:1.0", now)
        .await
        .unwrap();
    store
        .insert_resource_request(
            sub_unit_id,
            &DeclaredResources {
                cpu_request_cores: requests.0,
                cpu_limit_cores: requests.0 * 2.0,
                memory_request_bytes: requests.1,
                memory_limit_bytes: requests.1 * 2,
            },
            now,
        )
        .await
        .unwrap();
    for i in 0..samples {
        store
            .insert_snapshot(sub_unit_id, now - Duration::minutes(i + 1), usage.0, usage.1)
            .await
            .unwrap();
    }

    let sub_unit = store
        .sub_units_with_snapshots()
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.id == sub_unit_id)
        .unwrap();
    let engine = RecommendationEngine::new(store.clone(), Arc::new(EngineConfig::default()));
    engine.analyze(&sub_unit, now).await.unwrap();
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let store = Arc::new(SqliteStore::new(SqlitePool::memory().unwrap()));

    // Over-provisioned: 1 core / 512Mi requested, 0.2 core / 100Mi used
    seed_unit(&store, "shop", "api-0", (1.0, 512 * MIB), (0.2, 100 * MIB), 3).await;
    // Under-provisioned: 0.1 core / 128Mi requested, 0.5 core / 200Mi used
    seed_unit(&store, "billing", "ledger-0", (0.1, 128 * MIB), (0.5, 200 * MIB), 3).await;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLE_SOURCE).await;
    health_registry.register(components::HISTORY_STORE).await;
    health_registry.register(components::ORCHESTRATOR).await;

    let state = Arc::new(AppState::new(store, health_registry, EngineMetrics::new()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn recommendation_id(app: Router, unit_name: &str) -> i64 {
    let (_, body) = get(app, "/api/recommendations").await;
    body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["unit_name"] == unit_name)
        .unwrap()["id"]
        .as_i64()
        .unwrap()
}

#[tokio::test]
async fn test_list_pods_sorted_by_savings() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/pods").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 1);

    let pods = body["pods"].as_array().unwrap();
    assert_eq!(pods[0]["unit_name"], "api-0");
    assert_eq!(pods[0]["status"], "over-provisioned");
    assert_eq!(pods[1]["unit_name"], "ledger-0");
    assert_eq!(pods[1]["status"], "under-provisioned");
}

#[tokio::test]
async fn test_list_pods_filters() {
    let (app, _state) = setup_test_app().await;

    let (_, body) = get(app.clone(), "/api/pods?namespace=billing").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["pods"][0]["namespace"], "billing");

    let (_, body) = get(app.clone(), "/api/pods?status=over-provisioned&sort_by=name").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["pods"][0]["unit_name"], "api-0");

    let (_, body) = get(app.clone(), "/api/pods?search=LEDGER").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["pods"][0]["unit_name"], "ledger-0");

    let (_, body) = get(app, "/api/pods?limit=1").await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_list_pods_rejects_unknown_status() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/pods?status=wasteful").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("wasteful"));
}

#[tokio::test]
async fn test_pod_detail() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/api/pod/shop/api-0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pod"]["sub_unit_name"], "app");
    assert_eq!(body["analysis"]["status"], "over-provisioned");
    assert_eq!(body["usage_history"].as_array().unwrap().len(), 3);

    let (status, body) = get(app, "/api/pod/shop/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Pod not found");
}

#[tokio::test]
async fn test_list_recommendations() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/api/recommendations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 2);
    assert!(body["total_savings"].as_f64().unwrap() > 0.0);
    assert_eq!(body["recommendations"][0]["unit_name"], "api-0");
    assert_eq!(body["recommendations"][0]["applied"], false);

    // Three samples only ever earn low confidence
    let (_, body) = get(app.clone(), "/api/recommendations?confidence=high").await;
    assert_eq!(body["total_count"], 0);

    let (_, body) = get(app, "/api/recommendations?min_savings=1").await;
    assert_eq!(body["total_count"], 1);
}

#[tokio::test]
async fn test_recommendation_yaml_download() {
    let (app, _state) = setup_test_app().await;
    let id = recommendation_id(app.clone(), "api-0").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/recommendations/{}/yaml", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/yaml");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=patch-shop-api-0-app.yaml"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let yaml = String::from_utf8(body.to_vec()).unwrap();
    assert!(yaml.contains("kind: Pod"));
    assert!(yaml.contains("240m"));
    assert!(yaml.contains("120Mi"));
}

#[tokio::test]
async fn test_recommendation_yaml_errors() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/api/recommendations/abc/yaml").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid recommendation ID");

    let (status, body) = get(app, "/api/recommendations/999/yaml").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Recommendation not found");
}

#[tokio::test]
async fn test_apply_toggle() {
    let (app, _state) = setup_test_app().await;
    let id = recommendation_id(app.clone(), "api-0").await;
    let uri = format!("/api/recommendations/{}/apply", id);

    let (status, body) = post_json(app.clone(), &uri, r#"{"applied": true}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Recommendation updated successfully");

    let (_, body) = get(app.clone(), "/api/recommendations").await;
    let applied = body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == id)
        .unwrap()["applied"]
        .clone();
    assert_eq!(applied, true);

    let (status, _) = post_json(app, &uri, r#"{"applied": false}"#).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_apply_errors() {
    let (app, _state) = setup_test_app().await;
    let id = recommendation_id(app.clone(), "api-0").await;

    let (status, body) = post_json(
        app.clone(),
        &format!("/api/recommendations/{}/apply", id),
        "not json",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");

    let (status, _) = post_json(app, "/api/recommendations/999/apply", r#"{"applied": true}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_and_namespaces() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_units"], 2);
    assert_eq!(body["over_provisioned"], 1);
    assert_eq!(body["under_provisioned"], 1);
    assert!(body["last_analysis"].is_string());

    let (status, body) = get(app, "/api/namespaces").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespaces"], serde_json::json!(["billing", "shop"]));
}

#[tokio::test]
async fn test_healthz_degraded_is_still_ok() {
    let (app, state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["components"]["sample_source"].is_object());

    state
        .health_registry
        .set_degraded(components::SAMPLE_SOURCE, "metrics API not installed")
        .await;
    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::HISTORY_STORE, "disk I/O error")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_readiness_gates() {
    let (app, state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    state.health_registry.mark_store_initialized().await;
    state.health_registry.mark_cycle_completed().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    let started = Utc::now();
    let mut report = collector_lib::CycleReport::new(started);
    report.finished_at = started + Duration::seconds(2);
    state.metrics.record_cycle(&report);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("rightsizer_cycle_duration_seconds_bucket"));
    assert!(metrics_text.contains("rightsizer_last_cycle_timestamp_seconds"));
}
