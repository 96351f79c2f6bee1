//! HTTP API for health checks, Prometheus metrics and sentinel state

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::SentinelMetrics,
    LoopSnapshot, RemediationExecutor, RemediationTarget, Trigger,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SentinelMetrics,
    pub snapshots: watch::Receiver<LoopSnapshot>,
    pub executor: Arc<RemediationExecutor>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: SentinelMetrics,
        snapshots: watch::Receiver<LoopSnapshot>,
        executor: Arc<RemediationExecutor>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            snapshots,
            executor,
        }
    }
}

/// Error body for failed API calls
struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0 })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    /// RFC 3339 lower bound; defaults to the epoch
    pub since: Option<DateTime<Utc>>,
}

impl SinceQuery {
    fn cutoff(&self) -> DateTime<Utc> {
        self.since.unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct RemediationResponse {
    pub trigger: Trigger,
    pub affected: usize,
    pub targets: Vec<RemediationTarget>,
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
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
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Latest verdict and window
async fn status(State(state): State<Arc<AppState>>) -> Json<LoopSnapshot> {
    Json(state.snapshots.borrow().clone())
}

async fn incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SinceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let incidents = state
        .executor
        .audit()
        .query(query.cutoff())
        .map_err(|e| ApiError(e.to_string()))?;

    Ok(Json(incidents))
}

async fn export_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SinceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut buffer = Vec::new();
    let rows = state
        .executor
        .audit()
        .export_csv(query.cutoff(), &mut buffer)
        .map_err(|e| ApiError(e.to_string()))?;
    info!(rows = rows, "Exported incident log");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"sentinel_incidents.csv\"",
            ),
        ],
        buffer,
    ))
}

/// Manual trigger; bypasses the gate but not the audit trail
async fn remediate(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let observed_load = state
        .snapshots
        .borrow()
        .verdict
        .as_ref()
        .and_then(|v| v.current_load);

    let targets = state
        .executor
        .remediate(Trigger::Manual, observed_load)
        .await
        .map_err(|e| {
            warn!(error = %e, "Manual remediation failed");
            ApiError(format!("{:#}", e))
        })?;

    Ok(Json(RemediationResponse {
        trigger: Trigger::Manual,
        affected: targets.len(),
        targets,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/incidents", get(incidents))
        .route("/api/v1/incidents/export", get(export_incidents))
        .route("/api/v1/remediate", post(remediate))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
