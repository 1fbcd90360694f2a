use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Draft,
    Published,
}

/// Named price bucket; seat sections map onto zones by section code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingZone {
    pub name: String,
    pub price: f64,
    pub currency: String,
}

/// Display coordinates for one seat within the venue layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPosition {
    pub seat_id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSection {
    pub code: String,
    pub name: String,
    pub seats: Vec<SeatPosition>,
}

/// The slice of the Event collaborator this subsystem reads: published
/// check, pricing zones, venue layout for the seat plan, sold counter.
/// Event CRUD itself lives outside the reservation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub status: EventStatus,
    pub starts_at: DateTime<Utc>,
    /// section code -> zone
    pub pricing_zones: HashMap<String, PricingZone>,
    pub sections: Vec<VenueSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_map_svg: Option<String>,
    pub sold_count: i64,
}

impl Event {
    pub fn is_published(&self) -> bool {
        self.status == EventStatus::Published
    }

    /// Every seat id in the venue layout, the bulk-create index for publish.
    pub fn seat_index(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|s| s.seats.iter().map(|p| p.seat_id.clone()))
            .collect()
    }

    pub fn total_capacity(&self) -> usize {
        self.sections.iter().map(|s| s.seats.len()).sum()
    }
}
