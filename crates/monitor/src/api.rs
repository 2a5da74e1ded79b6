//! HTTP API for health checks, Prometheus metrics and volume history

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    history::{ErrorTracker, EventStore},
    observability::MonitorMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub store: EventStore,
    pub errors: ErrorTracker,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
        store: EventStore,
        errors: ErrorTracker,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            store,
            errors,
        }
    }
}

/// Per-volume summary exposed on the volumes endpoint
#[derive(Debug, Clone, Serialize)]
pub struct VolumeSummary {
    pub volume_id: String,
    pub event_count: usize,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_success: Option<bool>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
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
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Summaries for every volume the monitor has seen, evicted ones included
async fn list_volumes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut summaries = Vec::new();

    for volume_id in state.store.volume_ids().await {
        let events = state.store.events(&volume_id).await.unwrap_or_default();
        let last = events.last();

        summaries.push(VolumeSummary {
            consecutive_failures: state.errors.count(&volume_id).await,
            event_count: events.len(),
            last_event_at: last.map(|e| e.recorded_at),
            last_event_success: last.map(|e| e.success),
            volume_id,
        });
    }

    Json(summaries)
}

/// Ordered event history for one volume
async fn volume_events(
    Path(volume_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.store.events(&volume_id).await {
        Some(events) => (StatusCode::OK, Json(events)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown volume {}", volume_id) })),
        )
            .into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/volumes", get(list_volumes))
        .route("/api/v1/volumes/:volume_id/events", get(volume_events))
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
