//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::coordinator::{DepartureCoordinator, RefreshError, RefreshStatus, TransitFeed};
use crate::domain::Snapshot;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router<C: TransitFeed + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stops", get(list_stops::<C>))
        .route("/api/stops/:stop_id", get(stop_snapshot::<C>))
        .route("/api/stops/:stop_id/next", get(next_departure::<C>))
        .route("/api/stops/:stop_id/refresh", post(refresh_stop::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List monitored stops with their refresh status.
async fn list_stops<C: TransitFeed + 'static>(
    State(state): State<AppState<C>>,
) -> Json<StopListResponse> {
    let mut stops = Vec::with_capacity(state.registry.len());

    for coordinator in state.registry.iter() {
        let (snapshot, status) = coordinator.current().await;
        let departures = snapshot.map(|s| s.next_departures.len());

        stops.push(StopSummary {
            stop_id: coordinator.stop_id().to_string(),
            label: coordinator.label().to_string(),
            available: status.is_available(),
            departures,
            status,
        });
    }

    Json(StopListResponse { stops })
}

/// The last published snapshot of a stop.
async fn stop_snapshot<C: TransitFeed + 'static>(
    State(state): State<AppState<C>>,
    Path(stop_id): Path<String>,
) -> Result<Json<StopSnapshotResponse>, AppError> {
    let coordinator = find(&state, &stop_id)?;
    let (snapshot, status) = coordinator.current().await;
    let snapshot = snapshot.ok_or_else(|| uninitialised(&coordinator))?;
    Ok(Json(snapshot_response(&coordinator, snapshot, status)))
}

/// The next departure at a stop.
async fn next_departure<C: TransitFeed + 'static>(
    State(state): State<AppState<C>>,
    Path(stop_id): Path<String>,
) -> Result<Json<NextDepartureResponse>, AppError> {
    let coordinator = find(&state, &stop_id)?;
    let snapshot = coordinator
        .snapshot()
        .await
        .ok_or_else(|| uninitialised(&coordinator))?;
    Ok(Json(NextDepartureResponse::from_snapshot(
        coordinator.stop_id(),
        coordinator.label(),
        &snapshot,
    )))
}

/// Run a refresh cycle now and return its snapshot.
async fn refresh_stop<C: TransitFeed + 'static>(
    State(state): State<AppState<C>>,
    Path(stop_id): Path<String>,
) -> Result<Json<StopSnapshotResponse>, AppError> {
    let coordinator = find(&state, &stop_id)?;
    let snapshot = coordinator.refresh().await?;
    let status = coordinator.status().await;
    Ok(Json(snapshot_response(&coordinator, snapshot, status)))
}

fn find<C: TransitFeed>(
    state: &AppState<C>,
    stop_id: &str,
) -> Result<Arc<DepartureCoordinator<C>>, AppError> {
    state.registry.get(stop_id).ok_or_else(|| AppError::NotFound {
        message: format!("Unknown stop: {stop_id}"),
    })
}

fn uninitialised<C: TransitFeed>(coordinator: &DepartureCoordinator<C>) -> AppError {
    AppError::Unavailable {
        message: format!("No departures fetched yet for stop {}", coordinator.stop_id()),
    }
}

fn snapshot_response<C: TransitFeed>(
    coordinator: &DepartureCoordinator<C>,
    snapshot: Arc<Snapshot>,
    status: RefreshStatus,
) -> StopSnapshotResponse {
    StopSnapshotResponse {
        stop_id: coordinator.stop_id().to_string(),
        label: coordinator.label().to_string(),
        available: status.is_available(),
        status,
        snapshot,
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound { message: String },
    /// No snapshot has been published yet
    Unavailable { message: String },
    /// Upstream could not be reached during an on-demand refresh
    Upstream { message: String },
}

impl From<RefreshError> for AppError {
    fn from(e: RefreshError) -> Self {
        AppError::Upstream {
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
            AppError::Upstream { message } => (StatusCode::BAD_GATEWAY, message),
        };

        warn!(%status, %message, "Request failed");

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
