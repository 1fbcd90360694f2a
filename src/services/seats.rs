//! Hold arbiter.
//!
//! Grants, extends, and releases seat holds. Arbitration is optimistic: the
//! seat store's conditional updates decide every race, and a grant that
//! flips fewer rows than it asked for is compensated back out, so callers
//! observe either the whole requested set HELD or nothing.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::HoldCache;
use crate::config::ReservationConfig;
use crate::error::{Error, Result};
use crate::models::{SeatHold, SeatStatus};
use crate::realtime::EventRooms;
use crate::store::Stores;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    pub seat_id: String,
    pub status: SeatStatus,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSeat {
    pub seat_id: String,
    pub x: f64,
    pub y: f64,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSection {
    pub code: String,
    pub name: String,
    pub seats: Vec<PlanSeat>,
}

/// Venue layout merged with live seat status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPlan {
    pub event_id: String,
    pub event_name: String,
    pub sections: Vec<PlanSection>,
    pub pricing_zones: std::collections::HashMap<String, crate::models::PricingZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
}

#[derive(Clone)]
pub struct SeatService {
    stores: Stores,
    cache: HoldCache,
    rooms: Arc<EventRooms>,
    config: ReservationConfig,
}

impl SeatService {
    pub fn new(
        stores: Stores,
        cache: HoldCache,
        rooms: Arc<EventRooms>,
        config: ReservationConfig,
    ) -> Self {
        Self {
            stores,
            cache,
            rooms,
            config,
        }
    }

    fn hold_ttl(&self) -> Duration {
        Duration::minutes(self.config.hold_expiry_minutes)
    }

    /// Grant a hold on `seat_ids` for `session_id`, or extend the session's
    /// existing hold with the newly requested seats.
    ///
    /// All-or-nothing: any seat SOLD or held by a live foreign hold fails the
    /// whole call with no state change attributable to it. Stale foreign
    /// holds encountered along the way are reclaimed opportunistically.
    pub async fn hold_seats(
        &self,
        event_id: &str,
        seat_ids: &[String],
        session_id: &str,
        user_id: Option<String>,
    ) -> Result<SeatHold> {
        if session_id.is_empty() {
            return Err(Error::InvalidInput("sessionId is required".to_string()));
        }
        let requested = dedupe(seat_ids);
        if requested.is_empty() {
            return Err(Error::InvalidInput("seatIds must not be empty".to_string()));
        }
        if requested.len() > self.config.max_seats_per_hold {
            return Err(Error::InvalidInput(format!(
                "at most {} seats per hold",
                self.config.max_seats_per_hold
            )));
        }

        let event = self
            .stores
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {} not found", event_id)))?;
        if !event.is_published() {
            return Err(Error::event_not_bookable());
        }

        let rows = self.stores.seats.get_many(event_id, &requested).await?;
        if rows.len() != requested.len() {
            let known: HashSet<&str> = rows.iter().map(|r| r.seat_id.as_str()).collect();
            let missing = requested
                .iter()
                .find(|s| !known.contains(s.as_str()))
                .cloned()
                .unwrap_or_default();
            return Err(Error::NotFound(format!("seat {} not found", missing)));
        }

        let now = Utc::now();

        // The session's own hold, if it is still live. An expired own hold is
        // treated like any other stale hold below.
        let mut existing = self
            .stores
            .holds
            .find_by_session(event_id, session_id)
            .await?;
        if let Some(hold) = &existing {
            if hold.is_expired(now) {
                self.reclaim_stale(event_id, &hold.id, now).await;
                existing = None;
            }
        }

        // Partition the requested rows; reclaim stale foreign holds as they
        // are encountered, fail on sold or live-foreign-held seats.
        let mut to_claim = Vec::new();
        for row in &rows {
            match row.status {
                SeatStatus::Sold => return Err(Error::seat_conflict(&row.seat_id)),
                SeatStatus::Available => to_claim.push(row.seat_id.clone()),
                SeatStatus::Held => {
                    let hold_ref = row.hold_ref.clone().unwrap_or_default();
                    if let Some(mine) = &existing {
                        if hold_ref == mine.id {
                            // Idempotently already ours.
                            continue;
                        }
                    }
                    match self.stores.holds.get(&hold_ref).await? {
                        Some(other) if !other.is_expired(now) => {
                            return Err(Error::seat_conflict(&row.seat_id));
                        }
                        _ => {
                            // Missing or expired owner: reclaim, then claim.
                            self.reclaim_stale(event_id, &hold_ref, now).await;
                            to_claim.push(row.seat_id.clone());
                        }
                    }
                }
            }
        }

        let ttl = self.hold_ttl();
        match existing {
            Some(mut hold) => {
                if to_claim.is_empty() {
                    // Nothing new; refresh the TTL.
                    hold.expires_at = now + ttl;
                    self.stores.holds.update(&hold).await?;
                    self.cache.put(&hold).await;
                    return Ok(hold);
                }

                let claimed = self
                    .stores
                    .seats
                    .claim_available(event_id, &to_claim, &hold.id, now)
                    .await?;
                if claimed != to_claim.len() as u64 {
                    // Revert only what this call flipped; the pre-existing
                    // hold stays intact.
                    self.stores
                        .seats
                        .release_held(event_id, &hold.id, Some(&to_claim), now)
                        .await?;
                    return Err(self.conflict_within(event_id, &to_claim, &hold.id).await);
                }

                let mut seat_set: HashSet<String> = hold.seat_ids.iter().cloned().collect();
                for seat in &to_claim {
                    if seat_set.insert(seat.clone()) {
                        hold.seat_ids.push(seat.clone());
                    }
                }
                hold.expires_at = now + ttl;
                self.stores.holds.update(&hold).await?;
                self.cache.put(&hold).await;
                self.rooms
                    .publish_seat_updates(event_id, &to_claim, SeatStatus::Held)
                    .await;
                info!(
                    hold_id = %hold.id,
                    session_id = %session_id,
                    added = to_claim.len(),
                    total = hold.seat_ids.len(),
                    "hold extended"
                );
                Ok(hold)
            }
            None => {
                let hold = SeatHold::new(
                    event_id,
                    to_claim.clone(),
                    session_id,
                    user_id,
                    now,
                    ttl,
                );
                self.stores.holds.insert(&hold).await?;

                let claimed = self
                    .stores
                    .seats
                    .claim_available(event_id, &to_claim, &hold.id, now)
                    .await?;
                if claimed != to_claim.len() as u64 {
                    // Compensating rollback: revert the rows this hold did
                    // flip, drop the hold, surface the conflict.
                    self.stores
                        .seats
                        .release_held(event_id, &hold.id, None, now)
                        .await?;
                    self.stores.holds.delete(&hold.id).await?;
                    return Err(self.conflict_within(event_id, &to_claim, &hold.id).await);
                }

                self.cache.put(&hold).await;
                self.rooms
                    .publish_seat_updates(event_id, &to_claim, SeatStatus::Held)
                    .await;
                info!(
                    hold_id = %hold.id,
                    session_id = %session_id,
                    seats = to_claim.len(),
                    "hold granted"
                );
                Ok(hold)
            }
        }
    }

    /// Release a hold the session owns; every seat still HELD under it
    /// returns to AVAILABLE.
    pub async fn release_seats(&self, hold_id: &str, session_id: &str) -> Result<()> {
        let hold = self
            .stores
            .holds
            .get(hold_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("hold {} not found", hold_id)))?;
        if hold.session_id != session_id {
            return Err(Error::Unauthorized(
                "hold does not belong to this session".to_string(),
            ));
        }

        let now = Utc::now();
        let freed = self
            .stores
            .seats
            .release_held(&hold.event_id, hold_id, None, now)
            .await?;
        self.stores.holds.delete(hold_id).await?;
        self.cache.remove(hold_id).await;
        self.rooms
            .publish_seat_updates(&hold.event_id, &freed, SeatStatus::Available)
            .await;
        info!(hold_id = %hold_id, freed = freed.len(), "hold released");
        Ok(())
    }

    pub async fn get_availability(&self, event_id: &str) -> Result<Vec<SeatAvailability>> {
        self.stores
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {} not found", event_id)))?;
        let rows = self.stores.seats.list_for_event(event_id).await?;
        Ok(rows
            .into_iter()
            .map(|r| SeatAvailability {
                seat_id: r.seat_id,
                status: r.status,
                last_updated: r.last_updated,
            })
            .collect())
    }

    /// Venue layout with live statuses merged in.
    pub async fn get_seat_plan(&self, event_id: &str) -> Result<SeatPlan> {
        let event = self
            .stores
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {} not found", event_id)))?;
        let rows = self.stores.seats.list_for_event(event_id).await?;
        let status_of: std::collections::HashMap<&str, SeatStatus> = rows
            .iter()
            .map(|r| (r.seat_id.as_str(), r.status))
            .collect();

        let sections = event
            .sections
            .iter()
            .map(|section| PlanSection {
                code: section.code.clone(),
                name: section.name.clone(),
                seats: section
                    .seats
                    .iter()
                    .map(|pos| PlanSeat {
                        seat_id: pos.seat_id.clone(),
                        x: pos.x,
                        y: pos.y,
                        status: status_of
                            .get(pos.seat_id.as_str())
                            .copied()
                            .unwrap_or(SeatStatus::Available),
                    })
                    .collect(),
            })
            .collect();

        Ok(SeatPlan {
            event_id: event.id,
            event_name: event.name,
            sections,
            pricing_zones: event.pricing_zones,
            svg: event.seat_map_svg,
        })
    }

    /// Presentation read: cache first, store as the authority fallback.
    pub async fn get_hold(&self, hold_id: &str) -> Result<SeatHold> {
        if let Some(hold) = self.cache.get(hold_id).await {
            debug!(hold_id = %hold_id, "hold served from cache");
            return Ok(hold);
        }
        self.stores
            .holds
            .get(hold_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("hold {} not found", hold_id)))
    }

    /// Conditionally free every seat an orphaned hold still pins, then drop
    /// the hold row and its cache mirror. Safe to race: the seat update is
    /// predicated on `hold_ref` and HELD.
    async fn reclaim_stale(&self, event_id: &str, hold_id: &str, now: DateTime<Utc>) {
        match self
            .stores
            .seats
            .release_held(event_id, hold_id, None, now)
            .await
        {
            Ok(freed) => {
                if !freed.is_empty() {
                    warn!(hold_id = %hold_id, freed = freed.len(), "reclaimed stale hold");
                    self.rooms
                        .publish_seat_updates(event_id, &freed, SeatStatus::Available)
                        .await;
                }
            }
            Err(e) => warn!(hold_id = %hold_id, "stale hold reclamation failed: {}", e),
        }
        if let Err(e) = self.stores.holds.delete(hold_id).await {
            warn!(hold_id = %hold_id, "stale hold delete failed: {}", e);
        }
        self.cache.remove(hold_id).await;
    }

    /// Name the seat that lost the race for the conflict message.
    async fn conflict_within(
        &self,
        event_id: &str,
        attempted: &[String],
        our_hold: &str,
    ) -> Error {
        if let Ok(rows) = self.stores.seats.get_many(event_id, attempted).await {
            for row in rows {
                let ours = row.status == SeatStatus::Held
                    && row.hold_ref.as_deref() == Some(our_hold);
                if !ours && row.status != SeatStatus::Available {
                    return Error::seat_conflict(&row.seat_id);
                }
            }
        }
        Error::seat_conflict(attempted.first().map(String::as_str).unwrap_or("requested"))
    }
}

fn dedupe(seat_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    seat_ids
        .iter()
        .filter(|s| !s.is_empty() && seen.insert(s.as_str()))
        .cloned()
        .collect()
}
