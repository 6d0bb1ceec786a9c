//! HTTP API: reporting endpoints plus health checks and Prometheus metrics

use crate::health::{ComponentStatus, HealthRegistry};
use crate::models::{Confidence, Status};
use crate::observability::EngineMetrics;
use crate::report::{RecommendationFilter, ReportingStore, ResourcePatch, SortKey, UnitFilter};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Default page size of `/api/pods`
pub const DEFAULT_POD_LIMIT: usize = 50;

/// Default page size of `/api/recommendations`
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReportingStore>,
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReportingStore>,
        health_registry: HealthRegistry,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            store,
            health_registry,
            metrics,
        }
    }
}

/// Errors rendered as `{"error": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!(error = %err, "{}", context);
        ApiError::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct PodsQuery {
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<usize>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsQuery {
    pub confidence: Option<String>,
    pub min_savings: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub applied: bool,
}

/// Empty query values count as absent
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_param<T: std::str::FromStr<Err = String>>(value: Option<String>) -> ApiResult<Option<T>> {
    non_empty(value)
        .map(|v| v.parse::<T>().map_err(ApiError::BadRequest))
        .transpose()
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid recommendation ID".to_string()))
}

async fn list_pods(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PodsQuery>,
) -> ApiResult<impl IntoResponse> {
    let pods = match non_empty(query.search) {
        Some(term) => state.store.search(&term).await,
        None => {
            let filter = UnitFilter {
                namespace: non_empty(query.namespace),
                status: parse_param::<Status>(query.status)?,
                sort: parse_param::<SortKey>(query.sort_by)?.unwrap_or_default(),
                limit: Some(query.limit.unwrap_or(DEFAULT_POD_LIMIT)),
            };
            state.store.list(&filter).await
        }
    }
    .map_err(|e| ApiError::internal("Failed to fetch pods", e))?;

    Ok(Json(json!({
        "total": pods.len(),
        "pods": pods,
        "page": 1,
    })))
}

async fn get_pod(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let detail = state
        .store
        .get(&namespace, &name)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch pod", e))?
        .ok_or_else(|| ApiError::NotFound("Pod not found".to_string()))?;

    Ok(Json(json!({
        "pod": detail.view,
        "analysis": detail.analysis,
        "usage_history": detail.usage_history,
    })))
}

async fn list_recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationsQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = RecommendationFilter {
        confidence: parse_param::<Confidence>(query.confidence)?,
        min_savings: query.min_savings,
        limit: Some(query.limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)),
    };

    let recommendations = state
        .store
        .list_recommendations(&filter)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch recommendations", e))?;
    let total_savings: f64 = recommendations
        .iter()
        .map(|r| r.fields.monthly_savings)
        .sum();

    Ok(Json(json!({
        "total_count": recommendations.len(),
        "total_savings": total_savings,
        "recommendations": recommendations,
    })))
}

async fn recommendation_yaml(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let recommendation = state
        .store
        .get_recommendation(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch recommendation", e))?
        .ok_or_else(|| ApiError::NotFound("Recommendation not found".to_string()))?;

    let patch = ResourcePatch::from_recommendation(&recommendation);
    let yaml = patch
        .to_yaml()
        .map_err(|e| ApiError::internal("Failed to render patch", e))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/yaml".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", patch.filename()),
            ),
        ],
        yaml,
    )
        .into_response())
}

async fn apply_recommendation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<ApplyRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let Json(request) =
        body.map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;

    let updated = state
        .store
        .mark_applied(id, request.applied)
        .await
        .map_err(|e| ApiError::internal("Failed to update recommendation", e))?;
    if !updated {
        return Err(ApiError::NotFound("Recommendation not found".to_string()));
    }

    info!(recommendation_id = id, applied = request.applied, "Recommendation updated");
    Ok(Json(json!({
        "success": true,
        "message": "Recommendation updated successfully",
    })))
}

async fn statistics(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let stats = state
        .store
        .get_statistics()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch statistics", e))?;
    Ok(Json(stats))
}

async fn namespaces(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let namespaces = state
        .store
        .namespaces()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch namespaces", e))?;
    Ok(Json(json!({ "namespaces": namespaces })))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let body = state
        .metrics
        .gather()
        .map_err(|e| ApiError::internal("Failed to encode metrics", e))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/pods", get(list_pods))
        .route("/api/pod/:namespace/:name", get(get_pod))
        .route("/api/recommendations", get(list_recommendations))
        .route("/api/recommendations/:id/yaml", get(recommendation_yaml))
        .route("/api/recommendations/:id/apply", post(apply_recommendation))
        .route("/api/stats", get(statistics))
        .route("/api/namespaces", get(namespaces))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until shutdown is signalled
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
