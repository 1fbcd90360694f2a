use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-bounded reservation: exclusive intent to purchase a seat set.
///
/// At most one live hold exists per (event, session); repeat grants from the
/// same session extend this record instead of creating a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatHold {
    pub id: String,
    pub event_id: String,
    pub seat_ids: Vec<String>,
    pub session_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatHold {
    pub fn new(
        event_id: &str,
        seat_ids: Vec<String>,
        session_id: &str,
        user_id: Option<String>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        SeatHold {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.to_string(),
            seat_ids,
            session_id: session_id.to_string(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
