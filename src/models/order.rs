use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment lifecycle. Transitions form a DAG: PENDING -> {SUCCEEDED, FAILED},
/// SUCCEEDED -> REFUNDED. No implicit transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Monetary breakdown in decimal currency units, rounded to two decimals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: f64,
    pub fees: f64,
    pub tax: f64,
    pub total: f64,
}

/// One ticket per sold seat; the QR payload equals `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub seat_id: String,
    pub code: String,
    pub issued_at: DateTime<Utc>,
}

impl Ticket {
    pub fn issue(seat_id: &str, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4().to_string();
        Ticket {
            code: format!("TKT-{}", id.replace('-', "").to_uppercase()),
            id,
            seat_id: seat_id.to_string(),
            issued_at: now,
        }
    }
}

/// A purchase under way or complete.
///
/// `seat_ids` is a snapshot whose order matches the pricing breakdown.
/// Tickets are populated at finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub event_id: String,
    pub seat_ids: Vec<String>,
    pub customer: CustomerInfo,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: String,
    pub total_amount: f64,
    pub breakdown: PriceBreakdown,
    pub tickets: Vec<Ticket>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        event_id: &str,
        seat_ids: Vec<String>,
        customer: CustomerInfo,
        session_id: Option<String>,
        user_id: Option<String>,
        payment_intent_id: String,
        breakdown: PriceBreakdown,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let short = id.split('-').next().unwrap_or("0").to_uppercase();
        Order {
            order_number: format!("ORD-{}-{}", now.format("%Y%m%d"), short),
            id,
            event_id: event_id.to_string(),
            seat_ids,
            customer,
            session_id,
            user_id,
            payment_status: PaymentStatus::Pending,
            payment_intent_id,
            total_amount: breakdown.total,
            breakdown,
            tickets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
