//! Expiration worker.
//!
//! Bounds the blast radius of abandoned holds: every tick pages expired
//! holds, conditionally reclaims their seats, and fans the deltas out per
//! event. Because every reclamation is predicated on `hold_ref` and HELD it
//! commutes with grants and finalizes, so running replicas concurrently is
//! safe and no coordinator is needed.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cache::HoldCache;
use crate::config::ReservationConfig;
use crate::models::SeatStatus;
use crate::realtime::{session_room, EventRooms, RealtimeMessage};
use crate::store::Stores;

/// Holds within this much of expiry get a targeted warning push.
const WARN_WINDOW_SECONDS: i64 = 120;

pub struct ExpirationWorker {
    stores: Stores,
    cache: HoldCache,
    rooms: Arc<EventRooms>,
    period: std::time::Duration,
    page_size: usize,
}

impl ExpirationWorker {
    pub fn new(
        stores: Stores,
        cache: HoldCache,
        rooms: Arc<EventRooms>,
        config: &ReservationConfig,
    ) -> Self {
        Self {
            stores,
            cache,
            rooms,
            period: std::time::Duration::from_secs(config.worker_period_seconds),
            page_size: config.worker_page_size,
        }
    }

    /// Tick loop; stops scheduling once the shutdown flag flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(period_secs = self.period.as_secs(), "expiration worker started");
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("expiration worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One reclamation pass. Returns the number of holds reclaimed; exposed
    /// so tests and operators can drive it directly.
    pub async fn tick(&self) -> usize {
        let now = Utc::now();
        let expired = match self.stores.holds.list_expired(now, self.page_size).await {
            Ok(holds) => holds,
            Err(e) => {
                error!("failed to page expired holds: {}", e);
                return 0;
            }
        };

        if !expired.is_empty() {
            info!(count = expired.len(), "reclaiming expired holds");
        }

        // event_id -> freed seat ids, aggregated for one broadcast per event.
        let mut freed_by_event: HashMap<String, Vec<String>> = HashMap::new();
        let mut reclaimed = 0;

        for hold in expired {
            let freed = match self
                .stores
                .seats
                .release_held(&hold.event_id, &hold.id, None, now)
                .await
            {
                Ok(freed) => freed,
                Err(e) => {
                    // One bad hold must not stall the sweep.
                    warn!(hold_id = %hold.id, "seat reclamation failed: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.stores.holds.delete(&hold.id).await {
                warn!(hold_id = %hold.id, "expired hold delete failed: {}", e);
                continue;
            }
            self.cache.remove(&hold.id).await;
            reclaimed += 1;
            freed_by_event
                .entry(hold.event_id.clone())
                .or_default()
                .extend(freed);
        }

        for (event_id, seat_ids) in freed_by_event {
            if seat_ids.is_empty() {
                continue;
            }
            self.rooms
                .publish_seat_updates(&event_id, &seat_ids, SeatStatus::Available)
                .await;
            self.rooms
                .publish(
                    &crate::realtime::event_room(&event_id),
                    RealtimeMessage::HoldExpired {
                        event_id: event_id.clone(),
                        seat_ids,
                        timestamp: now,
                    },
                )
                .await;
        }

        self.warn_expiring_soon().await;

        if reclaimed > 0 {
            info!(reclaimed, "expiration sweep complete");
        }
        reclaimed
    }

    /// Targeted heads-up to sessions whose hold lapses within the window.
    async fn warn_expiring_soon(&self) {
        let now = Utc::now();
        let window = Duration::seconds(WARN_WINDOW_SECONDS);
        let expiring = match self.stores.holds.list_expiring_within(now, window).await {
            Ok(holds) => holds,
            Err(e) => {
                warn!("failed to list expiring holds: {}", e);
                return;
            }
        };
        for hold in expiring {
            self.rooms
                .publish(
                    &session_room(&hold.session_id),
                    RealtimeMessage::HoldExpiringSoon {
                        event_id: hold.event_id.clone(),
                        expires_at: hold.expires_at,
                        message: "Your seat hold is about to expire.".to_string(),
                    },
                )
                .await;
        }
    }
}
