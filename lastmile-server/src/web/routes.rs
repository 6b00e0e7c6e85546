//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::domain::{
    DestArea, DriverRoute, InvalidId, NewDriverRoute, NewRiderRequest, RequestId, RiderRequest,
    RouteId, StationId, Trip, TripId,
};
use crate::orchestrator::{MatchError, MatchRequest};
use crate::store::{PendingQuery, RiderDirectory, RouteRegistry, StoreError, TripLedger};

use super::dto::*;
use super::state::AppState;

/// Window for listing pending requests when the caller gives none.
const DEFAULT_LIST_WINDOW_MINUTES: u32 = 30;

/// Minutes until a new rider's deadline when the caller gives none.
const DEFAULT_ETA_MINUTES: i64 = 10;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rider/request", post(create_rider_request))
        .route(
            "/api/rider/request/:id",
            get(get_rider_request).delete(cancel_rider_request),
        )
        .route("/api/rider/requests", get(list_pending_requests))
        .route("/api/driver/route", post(register_route))
        .route("/api/driver/route/:id", get(get_route))
        .route("/api/driver/arrival", post(report_arrival))
        .route("/api/match", post(trigger_match))
        .route("/api/trips/:id", get(get_trip))
        .route("/api/trips/:id/start", post(start_trip))
        .route("/api/trips/:id/complete", post(complete_trip))
        .route("/api/trips/:id/cancel", post(cancel_trip))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn create_rider_request(
    State(state): State<AppState>,
    Json(req): Json<CreateRiderRequest>,
) -> Result<(StatusCode, Json<RiderRequest>), AppError> {
    let eta_unix = match (req.eta_unix, req.eta_minutes) {
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest {
                message: "give either eta_unix or eta_minutes, not both".to_string(),
            });
        }
        (Some(eta), None) => eta,
        (None, minutes) => {
            let minutes = minutes.unwrap_or(DEFAULT_ETA_MINUTES);
            minutes
                .checked_mul(60)
                .and_then(|secs| Utc::now().timestamp().checked_add(secs))
                .ok_or_else(|| AppError::BadRequest {
                    message: format!("eta_minutes {minutes} is out of range"),
                })?
        }
    };

    let request = state
        .orchestrator
        .directory()
        .add(NewRiderRequest {
            id: req.id,
            rider_id: req.rider_id,
            station_id: req.station_id,
            dest_area: req.dest_area,
            eta_unix,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_rider_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RiderRequest>, AppError> {
    let id = RequestId::parse(&id)?;
    let request = state.orchestrator.directory().get(&id).await?;
    Ok(Json(request))
}

/// Withdraw a pending request.
async fn cancel_rider_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RiderRequest>, AppError> {
    let id = RequestId::parse(&id)?;
    let request = state.orchestrator.directory().cancel(&id).await?;
    Ok(Json(request))
}

/// Pending requests at a station around a point in time.
async fn list_pending_requests(
    State(state): State<AppState>,
    Query(req): Query<PendingRequestsQuery>,
) -> Result<Json<PendingRequestsResponse>, AppError> {
    let query = PendingQuery {
        station_id: StationId::parse(&req.station_id)?,
        dest_area: req.dest_area.as_deref().map(DestArea::parse).transpose()?,
        now_unix: req.now_unix.unwrap_or_else(|| Utc::now().timestamp()),
        window_minutes: req.window_minutes.unwrap_or(DEFAULT_LIST_WINDOW_MINUTES),
    };

    let requests = state
        .orchestrator
        .directory()
        .list_pending_at_station(&query)
        .await?;
    Ok(Json(PendingRequestsResponse { requests }))
}

async fn register_route(
    State(state): State<AppState>,
    Json(req): Json<NewDriverRoute>,
) -> Result<(StatusCode, Json<DriverRoute>), AppError> {
    let route = state.orchestrator.registry().register_route(req).await?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DriverRoute>, AppError> {
    let id = RouteId::parse(&id)?;
    let route = state.orchestrator.registry().get_route(&id).await?;
    Ok(Json(route))
}

/// Queue a driver arrival for the background matcher.
async fn report_arrival(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.arrivals.try_send(req).map_err(|e| match e {
        TrySendError::Full(_) => AppError::Unavailable {
            message: "arrival queue is full".into(),
        },
        TrySendError::Closed(_) => AppError::Unavailable {
            message: "arrival intake is shut down".into(),
        },
    })?;
    Ok((StatusCode::ACCEPTED, Json(ArrivalAccepted { queued: true })))
}

/// Run a match synchronously.
async fn trigger_match(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    let outcome = state.orchestrator.try_match(req).await?;
    Ok(Json(MatchResponse::from(outcome)))
}

async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    let id = TripId::parse(&id)?;
    let trip = state.orchestrator.ledger().get_trip(&id).await?;
    Ok(Json(trip))
}

async fn start_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    let id = TripId::parse(&id)?;
    Ok(Json(state.orchestrator.start_trip(&id).await?))
}

async fn complete_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    let id = TripId::parse(&id)?;
    Ok(Json(state.orchestrator.complete_trip(&id).await?))
}

async fn cancel_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    let id = TripId::parse(&id)?;
    Ok(Json(state.orchestrator.cancel_trip(&id).await?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
    Conflict { message: String },
    /// A dependency failed in a way that may clear up on retry.
    Unavailable { message: String },
    Internal { message: String },
}

impl From<InvalidId> for AppError {
    fn from(e: InvalidId) -> Self {
        AppError::BadRequest {
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::NotFound { .. } => AppError::NotFound { message },
            StoreError::InvalidArgument(_) => AppError::BadRequest { message },
            StoreError::Conflict(_) => AppError::Conflict { message },
            StoreError::Unavailable(_) | StoreError::Timeout(_) => AppError::Unavailable { message },
        }
    }
}

impl From<MatchError> for AppError {
    fn from(e: MatchError) -> Self {
        let message = e.to_string();
        match e {
            MatchError::NotFound { .. } => AppError::NotFound { message },
            MatchError::InvalidArgument(_) => AppError::BadRequest { message },
            MatchError::Conflict(_) | MatchError::InvalidTransition { .. } => {
                AppError::Conflict { message }
            }
            MatchError::Store(store) => AppError::from(store),
            MatchError::Contention { .. } => AppError::Unavailable { message },
            MatchError::Aborted(_) => AppError::Internal { message },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Conflict { message } => (StatusCode::CONFLICT, message),
            AppError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, "{message}");
        } else {
            warn!(%status, "{message}");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
