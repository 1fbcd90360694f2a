use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::{CustomerInfo, Order};
use crate::services::orders::CheckoutRequest;
use crate::AppState;
use crate::error::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/checkout-intent", post(create_checkout_intent))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/finalize", post(finalize_order))
}

// POST /api/orders/checkout-intent
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CheckoutIntentRequest {
    event_id: String,
    seat_ids: Vec<String>,
    customer_info: CustomerInfo,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutIntentResponse {
    order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
}

async fn create_checkout_intent(
    State(state): State<AppState>,
    Json(req): Json<CheckoutIntentRequest>,
) -> Result<impl IntoResponse> {
    let (order, client_secret) = state
        .orders
        .create_checkout_intent(CheckoutRequest {
            event_id: req.event_id,
            seat_ids: req.seat_ids,
            customer: req.customer_info,
            session_id: req.session_id.filter(|s| !s.is_empty()),
            user_id: req.user_id,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutIntentResponse {
            order,
            client_secret,
        }),
    ))
}

// GET /api/orders/{order_id}
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse> {
    let order = state.orders.get_order(&order_id).await?;
    Ok((StatusCode::OK, Json(order)))
}

// POST /api/orders/{order_id}/finalize
async fn finalize_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse> {
    let order = state.orders.finalize_order(&order_id).await?;
    Ok((StatusCode::OK, Json(order)))
}
