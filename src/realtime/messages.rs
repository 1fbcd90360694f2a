use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SeatStatus;

/// One seat delta inside an availability update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatDelta {
    pub seat_id: String,
    pub status: SeatStatus,
}

/// Server -> client messages fanned out through the event rooms.
///
/// Delivery is best-effort, at-least-once; clients apply updates as
/// idempotent state and re-poll availability after a reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RealtimeMessage {
    /// Emitted on grant, release, finalize, and expiration.
    SeatAvailabilityUpdate {
        event_id: String,
        updates: Vec<SeatDelta>,
        timestamp: DateTime<Utc>,
    },
    /// Emitted by the expiration worker in addition to the availability update.
    HoldExpired {
        event_id: String,
        seat_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// Targeted at the owning session shortly before its hold lapses.
    HoldExpiringSoon {
        event_id: String,
        expires_at: DateTime<Utc>,
        message: String,
    },
    /// Current room membership, best-effort.
    ViewersUpdate { event_id: String, count: usize },
    JoinedEvent { event_id: String, message: String },
    Error { message: String },
}

/// Client -> server messages over the websocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinEvent { event_id: String },
    LeaveEvent { event_id: String },
    Ping,
}
