use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Seat lifecycle status. SOLD is terminal within an event's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Held,
    Sold,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Sold => "SOLD",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "HELD" => Ok(SeatStatus::Held),
            "SOLD" => Ok(SeatStatus::Sold),
            other => Err(Error::Internal(format!("unknown seat status '{}'", other))),
        }
    }
}

/// One row per (event, seat).
///
/// `hold_ref` is set iff HELD, `order_ref` iff SOLD. `version` increments on
/// every committed mutation; all writers condition on the current `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatState {
    pub event_id: String,
    pub seat_id: String,
    pub status: SeatStatus,
    pub hold_ref: Option<String>,
    pub order_ref: Option<String>,
    pub version: i64,
    pub last_updated: DateTime<Utc>,
}

impl SeatState {
    pub fn available(event_id: &str, seat_id: &str, now: DateTime<Utc>) -> Self {
        SeatState {
            event_id: event_id.to_string(),
            seat_id: seat_id.to_string(),
            status: SeatStatus::Available,
            hold_ref: None,
            order_ref: None,
            version: 0,
            last_updated: now,
        }
    }
}

/// Parsed form of a seat identifier.
///
/// Identifiers follow `SECTION-ROW-SEAT` (`ORC-R1-S5`) or the prefixed
/// `SEC-SECTION-ROW-SEAT` (`SEC-A-R3-S12`). The subsystem treats them as
/// opaque except for section extraction during pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRef {
    pub section: String,
    pub row: Option<u32>,
    pub number: Option<u32>,
}

impl SeatRef {
    pub fn parse(seat_id: &str) -> Result<Self> {
        let tokens: Vec<&str> = seat_id.split('-').collect();
        let (section, rest) = match tokens.as_slice() {
            ["SEC", section, rest @ ..] if !section.is_empty() => (*section, rest),
            [section, rest @ ..] if !section.is_empty() => (*section, rest),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "malformed seat identifier '{}'",
                    seat_id
                )))
            }
        };

        let mut row = None;
        let mut number = None;
        for token in rest {
            if let Some(n) = token.strip_prefix('R') {
                row = n.parse().ok().or(row);
            } else if let Some(n) = token.strip_prefix('S') {
                number = n.parse().ok().or(number);
            }
        }

        Ok(SeatRef {
            section: section.to_string(),
            row,
            number,
        })
    }

    /// Section code only, the piece pricing needs.
    pub fn section_of(seat_id: &str) -> Result<String> {
        Ok(SeatRef::parse(seat_id)?.section)
    }
}
