pub mod messages;
pub mod ws;

pub use messages::{ClientMessage, RealtimeMessage, SeatDelta};

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use crate::models::SeatStatus;

/// Per-message buffer for a room channel; lagged receivers drop messages,
/// which is acceptable under the best-effort delivery model.
const ROOM_CAPACITY: usize = 256;

pub fn event_room(event_id: &str) -> String {
    format!("event:{}", event_id)
}

pub fn session_room(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Per-room fan-out over tokio broadcast channels.
///
/// Rooms are created lazily on first subscribe or publish. Publishes from a
/// single writer arrive in order within a room; across rooms there is no
/// ordering guarantee. Nothing is persisted - the seat store stays the
/// authority and clients re-poll after reconnect.
pub struct EventRooms {
    rooms: RwLock<HashMap<String, broadcast::Sender<RealtimeMessage>>>,
    viewers: RwLock<HashMap<String, usize>>,
}

impl EventRooms {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            viewers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<RealtimeMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Fire-and-forget publish; a room with no subscribers swallows the
    /// message silently.
    pub async fn publish(&self, room: &str, message: RealtimeMessage) {
        let rooms = self.rooms.read().await;
        if let Some(sender) = rooms.get(room) {
            let _ = sender.send(message);
        }
    }

    /// Convenience for the common delta fan-out after a commit.
    pub async fn publish_seat_updates(
        &self,
        event_id: &str,
        seat_ids: &[String],
        status: SeatStatus,
    ) {
        if seat_ids.is_empty() {
            return;
        }
        let updates = seat_ids
            .iter()
            .map(|seat_id| SeatDelta {
                seat_id: seat_id.clone(),
                status,
            })
            .collect();
        self.publish(
            &event_room(event_id),
            RealtimeMessage::SeatAvailabilityUpdate {
                event_id: event_id.to_string(),
                updates,
                timestamp: Utc::now(),
            },
        )
        .await;
    }

    /// Register a viewer and fan out the new count.
    pub async fn join(&self, event_id: &str) -> usize {
        let count = {
            let mut viewers = self.viewers.write().await;
            let entry = viewers.entry(event_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.publish(
            &event_room(event_id),
            RealtimeMessage::ViewersUpdate {
                event_id: event_id.to_string(),
                count,
            },
        )
        .await;
        count
    }

    pub async fn leave(&self, event_id: &str) -> usize {
        let count = {
            let mut viewers = self.viewers.write().await;
            match viewers.get_mut(event_id) {
                Some(entry) => {
                    *entry = entry.saturating_sub(1);
                    *entry
                }
                None => 0,
            }
        };
        self.publish(
            &event_room(event_id),
            RealtimeMessage::ViewersUpdate {
                event_id: event_id.to_string(),
                count,
            },
        )
        .await;
        count
    }

    pub async fn viewer_count(&self, event_id: &str) -> usize {
        self.viewers
            .read()
            .await
            .get(event_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for EventRooms {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_reach_subscribers_in_order() {
        let rooms = EventRooms::new();
        let mut rx = rooms.subscribe(&event_room("E1")).await;

        for seat in ["A-R1-S1", "A-R1-S2", "A-R1-S3"] {
            rooms
                .publish_seat_updates("E1", &[seat.to_string()], SeatStatus::Held)
                .await;
        }

        for expected in ["A-R1-S1", "A-R1-S2", "A-R1-S3"] {
            match rx.recv().await.unwrap() {
                RealtimeMessage::SeatAvailabilityUpdate { updates, .. } => {
                    assert_eq!(updates[0].seat_id, expected);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let rooms = EventRooms::new();
        rooms
            .publish_seat_updates("E1", &["A-R1-S1".to_string()], SeatStatus::Sold)
            .await;
    }

    #[tokio::test]
    async fn join_and_leave_track_viewer_counts() {
        let rooms = EventRooms::new();
        assert_eq!(rooms.join("E1").await, 1);
        assert_eq!(rooms.join("E1").await, 2);
        assert_eq!(rooms.leave("E1").await, 1);
        assert_eq!(rooms.viewer_count("E1").await, 1);
        assert_eq!(rooms.viewer_count("E2").await, 0);
    }

    #[tokio::test]
    async fn rooms_are_isolated_per_event() {
        let rooms = EventRooms::new();
        let mut rx_e1 = rooms.subscribe(&event_room("E1")).await;
        let mut rx_e2 = rooms.subscribe(&event_room("E2")).await;

        rooms
            .publish_seat_updates("E2", &["B-R1-S1".to_string()], SeatStatus::Held)
            .await;

        match rx_e2.recv().await.unwrap() {
            RealtimeMessage::SeatAvailabilityUpdate { event_id, .. } => {
                assert_eq!(event_id, "E2");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(rx_e1.try_recv().is_err());
    }
}
