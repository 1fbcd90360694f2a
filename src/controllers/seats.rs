use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/seats/event/{event_id}/status", get(get_event_status))
        .route("/seats/event/{event_id}/plan", get(get_event_plan))
        .route("/seats/hold", post(hold_seats))
        .route("/seats/hold/{hold_id}", get(get_hold))
        .route("/seats/release", delete(release_seats))
}

// GET /api/seats/event/{event_id}/status
async fn get_event_status(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse> {
    let availability = state.seats.get_availability(&event_id).await?;
    Ok((StatusCode::OK, Json(availability)))
}

// GET /api/seats/event/{event_id}/plan
async fn get_event_plan(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse> {
    let plan = state.seats.get_seat_plan(&event_id).await?;
    Ok((StatusCode::OK, Json(plan)))
}

// POST /api/seats/hold
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HoldSeatsRequest {
    event_id: String,
    seat_ids: Vec<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

async fn hold_seats(
    State(state): State<AppState>,
    Json(req): Json<HoldSeatsRequest>,
) -> Result<impl IntoResponse> {
    let session_id = req
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidInput("sessionId is required".to_string()))?;

    state.hold_limiter.check(&session_id).await?;

    let hold = state
        .seats
        .hold_seats(&req.event_id, &req.seat_ids, &session_id, req.user_id)
        .await?;
    Ok((StatusCode::OK, Json(hold)))
}

// GET /api/seats/hold/{hold_id}
async fn get_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<String>,
) -> Result<impl IntoResponse> {
    let hold = state.seats.get_hold(&hold_id).await?;
    Ok((StatusCode::OK, Json(hold)))
}

// DELETE /api/seats/release
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReleaseSeatsRequest {
    hold_id: String,
    session_id: String,
}

async fn release_seats(
    State(state): State<AppState>,
    Json(req): Json<ReleaseSeatsRequest>,
) -> Result<impl IntoResponse> {
    state.seats.release_seats(&req.hold_id, &req.session_id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Hold released" })),
    ))
}
