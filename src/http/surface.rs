//! Per-service HTTP surface. Router assembly follows the teacher's
//! `public_routes`/`protected_routes` merge in `main.rs`; the `/metrics`
//! API-key + rate-limit guard generalises
//! `middleware/rate_limit.rs`'s per-IP limiter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;

use crate::config::ApiKeyConfig;
use crate::observability::ServiceMetrics;
use crate::resilience::{SlidingWindowRateLimiter, ServiceRegistry};

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub status: String,
    pub last_check: i64,
}

pub struct HttpSurfaceState {
    pub service_name: String,
    pub started_at: Instant,
    pub registry: Arc<ServiceRegistry>,
    pub metrics: ServiceMetrics,
    pub dependencies: RwLock<HashMap<String, DependencyStatus>>,
    pub api_key: ApiKeyConfig,
    pub metrics_rate_limiter: SlidingWindowRateLimiter,
    pub running: Arc<AtomicBool>,
}

impl HttpSurfaceState {
    pub fn new(service_name: &str, registry: Arc<ServiceRegistry>, metrics: ServiceMetrics, api_key: ApiKeyConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            service_name: service_name.to_string(),
            started_at: Instant::now(),
            registry,
            metrics,
            dependencies: RwLock::new(HashMap::new()),
            api_key,
            metrics_rate_limiter: SlidingWindowRateLimiter::new(60, Duration::from_secs(60)),
            running,
        }
    }

    pub fn set_dependency(&self, name: &str, healthy: bool) {
        self.dependencies.write().insert(
            name.to_string(),
            DependencyStatus {
                status: if healthy { "healthy".into() } else { "unhealthy".into() },
                last_check: chrono::Utc::now().timestamp(),
            },
        );
    }

    fn all_dependencies_healthy(&self) -> bool {
        self.dependencies.read().values().all(|d| d.status == "healthy")
    }
}

pub fn build_router(state: Arc<HttpSurfaceState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<Arc<HttpSurfaceState>>) -> Response {
    if state.running.load(Ordering::SeqCst) && state.all_dependencies_healthy() {
        (StatusCode::OK, Json(json!({"status": "healthy", "service": state.service_name}))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unhealthy", "service": state.service_name}))).into_response()
    }
}

async fn ready(State(state): State<Arc<HttpSurfaceState>>) -> Response {
    if state.running.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({"status": "ready", "service": state.service_name}))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not_ready", "service": state.service_name}))).into_response()
    }
}

async fn status(State(state): State<Arc<HttpSurfaceState>>) -> Response {
    let deps = state.dependencies.read().clone();
    let overall = if deps.values().all(|d| d.status == "healthy") { "healthy" } else { "degraded" };
    Json(json!({
        "service": state.service_name,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "dependencies": deps,
        "status": overall,
    }))
    .into_response()
}

#[derive(serde::Deserialize)]
struct MetricsQuery {
    api_key: Option<String>,
}

async fn metrics(
    State(state): State<Arc<HttpSurfaceState>>,
    headers: HeaderMap,
    Query(query): Query<MetricsQuery>,
) -> Response {
    if state.api_key.enabled {
        let supplied = headers
            .get("X-API-Key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .or(query.api_key);
        let authorized = supplied.map(|k| state.api_key.keys.contains(&k)).unwrap_or(false);
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized", "message": "missing or invalid API key"})),
            )
                .into_response();
        }
    }

    if !state.metrics_rate_limiter.try_acquire() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate_limited", "message": "too many requests to /metrics"})),
        )
            .into_response();
    }

    (StatusCode::OK, state.metrics.render()).into_response()
}
