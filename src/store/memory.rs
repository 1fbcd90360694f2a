//! In-memory store backends.
//!
//! Power the no-database mode and the test suite. Each operation takes one
//! write lock, so the conditional-update semantics match the durable
//! backend: status predicates are evaluated and applied atomically, and the
//! modified count reflects exactly the rows that satisfied them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Event, Order, SeatHold, SeatState, SeatStatus};

use super::{EventStore, HoldStore, OrderStore, SeatStore};

pub struct MemorySeatStore {
    rows: RwLock<HashMap<(String, String), SeatState>>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Test hook: overwrite a row unconditionally, bypassing the CAS
    /// discipline (used to induce store-level anomalies).
    pub async fn force_put(&self, row: SeatState) {
        let mut rows = self.rows.write().await;
        rows.insert((row.event_id.clone(), row.seat_id.clone()), row);
    }
}

impl Default for MemorySeatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn insert_all(&self, new_rows: Vec<SeatState>) -> Result<()> {
        let mut rows = self.rows.write().await;
        for row in new_rows {
            rows.insert((row.event_id.clone(), row.seat_id.clone()), row);
        }
        Ok(())
    }

    async fn get_many(&self, event_id: &str, seat_ids: &[String]) -> Result<Vec<SeatState>> {
        let rows = self.rows.read().await;
        Ok(seat_ids
            .iter()
            .filter_map(|sid| rows.get(&(event_id.to_string(), sid.clone())).cloned())
            .collect())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<SeatState>> {
        let rows = self.rows.read().await;
        let mut out: Vec<SeatState> = rows
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.seat_id.cmp(&b.seat_id));
        Ok(out)
    }

    async fn claim_available(
        &self,
        event_id: &str,
        seat_ids: &[String],
        hold_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut modified = 0;
        for sid in seat_ids {
            if let Some(row) = rows.get_mut(&(event_id.to_string(), sid.clone())) {
                if row.status == SeatStatus::Available {
                    row.status = SeatStatus::Held;
                    row.hold_ref = Some(hold_id.to_string());
                    row.version += 1;
                    row.last_updated = now;
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }

    async fn release_held(
        &self,
        event_id: &str,
        hold_id: &str,
        seat_ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut rows = self.rows.write().await;
        let mut freed = Vec::new();
        for ((eid, sid), row) in rows.iter_mut() {
            if eid != event_id {
                continue;
            }
            if let Some(subset) = seat_ids {
                if !subset.contains(sid) {
                    continue;
                }
            }
            if row.status == SeatStatus::Held && row.hold_ref.as_deref() == Some(hold_id) {
                row.status = SeatStatus::Available;
                row.hold_ref = None;
                row.version += 1;
                row.last_updated = now;
                freed.push(sid.clone());
            }
        }
        freed.sort();
        Ok(freed)
    }

    async fn mark_sold(
        &self,
        event_id: &str,
        seat_ids: &[String],
        order_id: &str,
        allowed_hold: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut modified = 0;
        for sid in seat_ids {
            if let Some(row) = rows.get_mut(&(event_id.to_string(), sid.clone())) {
                let claimable = match row.status {
                    SeatStatus::Available => true,
                    SeatStatus::Held => row.hold_ref.as_deref() == allowed_hold,
                    SeatStatus::Sold => false,
                };
                if claimable {
                    row.status = SeatStatus::Sold;
                    row.hold_ref = None;
                    row.order_ref = Some(order_id.to_string());
                    row.version += 1;
                    row.last_updated = now;
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }

    async fn revert_sold(
        &self,
        event_id: &str,
        seat_ids: &[String],
        order_id: &str,
        restore_hold: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let mut modified = 0;
        for sid in seat_ids {
            if let Some(row) = rows.get_mut(&(event_id.to_string(), sid.clone())) {
                if row.status == SeatStatus::Sold && row.order_ref.as_deref() == Some(order_id) {
                    match restore_hold {
                        Some(hold_id) => {
                            row.status = SeatStatus::Held;
                            row.hold_ref = Some(hold_id.to_string());
                        }
                        None => {
                            row.status = SeatStatus::Available;
                            row.hold_ref = None;
                        }
                    }
                    row.order_ref = None;
                    row.version += 1;
                    row.last_updated = now;
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }
}

pub struct MemoryHoldStore {
    holds: RwLock<HashMap<String, SeatHold>>,
}

impl MemoryHoldStore {
    pub fn new() -> Self {
        Self {
            holds: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryHoldStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HoldStore for MemoryHoldStore {
    async fn insert(&self, hold: &SeatHold) -> Result<()> {
        let mut holds = self.holds.write().await;
        holds.insert(hold.id.clone(), hold.clone());
        Ok(())
    }

    async fn get(&self, hold_id: &str) -> Result<Option<SeatHold>> {
        Ok(self.holds.read().await.get(hold_id).cloned())
    }

    async fn find_by_session(
        &self,
        event_id: &str,
        session_id: &str,
    ) -> Result<Option<SeatHold>> {
        let holds = self.holds.read().await;
        Ok(holds
            .values()
            .filter(|h| h.event_id == event_id && h.session_id == session_id)
            .max_by_key(|h| h.expires_at)
            .cloned())
    }

    async fn update(&self, hold: &SeatHold) -> Result<()> {
        let mut holds = self.holds.write().await;
        match holds.get_mut(&hold.id) {
            Some(existing) => {
                *existing = hold.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("hold {} not found", hold.id))),
        }
    }

    async fn delete(&self, hold_id: &str) -> Result<()> {
        self.holds.write().await.remove(hold_id);
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SeatHold>> {
        let holds = self.holds.read().await;
        let mut expired: Vec<SeatHold> = holds
            .values()
            .filter(|h| h.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|h| h.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn list_expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<SeatHold>> {
        let holds = self.holds.read().await;
        Ok(holds
            .values()
            .filter(|h| h.expires_at >= now && h.expires_at < now + window)
            .cloned()
            .collect())
    }
}

pub struct MemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn find_by_intent(&self, payment_intent_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn update(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("order {} not found", order.id))),
        }
    }
}

pub struct MemoryEventStore {
    events: RwLock<HashMap<String, Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: &Event) -> Result<()> {
        let mut events = self.events.write().await;
        events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().await.get(event_id).cloned())
    }

    async fn increment_sold(&self, event_id: &str, count: i64) -> Result<()> {
        let mut events = self.events.write().await;
        match events.get_mut(event_id) {
            Some(event) => {
                event.sold_count += count;
                Ok(())
            }
            None => Err(Error::NotFound(format!("event {} not found", event_id))),
        }
    }
}
