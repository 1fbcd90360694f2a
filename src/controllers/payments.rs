use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::services::payment::verify_webhook_signature;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}

const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    id: String,
}

// POST /api/payments/webhook
//
// The body is consumed raw: the signature covers the exact bytes the
// provider sent, so parsing happens only after verification.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    if let Some(secret) = &state.config.payment.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                Error::Unauthenticated("missing webhook signature".to_string())
            })?;
        if !verify_webhook_signature(secret, &body, signature) {
            return Err(Error::Unauthenticated(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidInput(format!("malformed webhook payload: {}", e)))?;

    info!(event_type = %event.event_type, intent_id = %event.data.id, "payment webhook received");

    match event.event_type.as_str() {
        "payment_intent.succeeded" => match state.orders.on_payment_success(&event.data.id).await {
            Ok(order) => Ok((
                StatusCode::OK,
                Json(json!({ "received": true, "orderNumber": order.order_number })),
            )),
            // An intent we never recorded is acknowledged so the provider
            // stops retrying; reconciliation happens out of band.
            Err(Error::NotFound(_)) => {
                warn!(intent_id = %event.data.id, "webhook for unknown intent acknowledged");
                Ok((StatusCode::OK, Json(json!({ "received": true }))))
            }
            Err(e) => Err(e),
        },
        "payment_intent.payment_failed" => {
            match state.orders.on_payment_failure(&event.data.id).await {
                Ok(_) => Ok((StatusCode::OK, Json(json!({ "received": true })))),
                Err(Error::NotFound(_)) => {
                    Ok((StatusCode::OK, Json(json!({ "received": true }))))
                }
                Err(e) => Err(e),
            }
        }
        other => {
            // Unhandled event types are acknowledged, not errored.
            info!(event_type = %other, "ignoring unhandled webhook event type");
            Ok((StatusCode::OK, Json(json!({ "received": true }))))
        }
    }
}
