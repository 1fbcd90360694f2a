pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Event, Order, SeatHold, SeatState};

/// Durable per-(event, seat) state rows.
///
/// Every mutation is conditional on the current status and reports how many
/// rows it actually changed; that count is the arbitration result under
/// contention. No caller takes an explicit lock.
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Bulk insert at event publish; one AVAILABLE row per seat.
    async fn insert_all(&self, rows: Vec<SeatState>) -> Result<()>;

    async fn get_many(&self, event_id: &str, seat_ids: &[String]) -> Result<Vec<SeatState>>;

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<SeatState>>;

    /// AVAILABLE -> HELD under `hold_id` for each seat in the set.
    /// Returns the number of rows flipped; a smaller count than requested
    /// means another writer won part of the set.
    async fn claim_available(
        &self,
        event_id: &str,
        seat_ids: &[String],
        hold_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// HELD under `hold_id` -> AVAILABLE. Restricted to `seat_ids` when
    /// given, otherwise every row the hold still owns. Returns the freed
    /// seat ids.
    async fn release_held(
        &self,
        event_id: &str,
        hold_id: &str,
        seat_ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    /// Finalize flip: AVAILABLE, or HELD under `allowed_hold`, -> SOLD under
    /// `order_id`. Seats held by any other hold (and SOLD seats) do not
    /// match, so the returned count falls short and the caller surfaces the
    /// conflict instead of stealing a competitor's hold.
    async fn mark_sold(
        &self,
        event_id: &str,
        seat_ids: &[String],
        order_id: &str,
        allowed_hold: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Compensation for a partial finalize: SOLD under `order_id` -> back to
    /// HELD under `restore_hold`, or AVAILABLE when `restore_hold` is None.
    async fn revert_sold(
        &self,
        event_id: &str,
        seat_ids: &[String],
        order_id: &str,
        restore_hold: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

/// Durable reservation records with TTL-driven expiry.
#[async_trait]
pub trait HoldStore: Send + Sync {
    async fn insert(&self, hold: &SeatHold) -> Result<()>;
    async fn get(&self, hold_id: &str) -> Result<Option<SeatHold>>;
    async fn find_by_session(&self, event_id: &str, session_id: &str)
        -> Result<Option<SeatHold>>;
    async fn update(&self, hold: &SeatHold) -> Result<()>;
    async fn delete(&self, hold_id: &str) -> Result<()>;
    /// Expired holds, oldest first, bounded page.
    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SeatHold>>;
    /// Live holds whose remaining TTL is inside `window`.
    async fn list_expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<SeatHold>>;
}

/// Durable purchase records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;
    async fn get(&self, order_id: &str) -> Result<Option<Order>>;
    async fn find_by_intent(&self, payment_intent_id: &str) -> Result<Option<Order>>;
    async fn update(&self, order: &Order) -> Result<()>;
}

/// Read-mostly event surface: published check, zones, layout, sold counter.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &Event) -> Result<()>;
    async fn get(&self, event_id: &str) -> Result<Option<Event>>;
    async fn increment_sold(&self, event_id: &str, count: i64) -> Result<()>;
}

/// Bundle of the four stores shared through `AppState`.
#[derive(Clone)]
pub struct Stores {
    pub seats: Arc<dyn SeatStore>,
    pub holds: Arc<dyn HoldStore>,
    pub orders: Arc<dyn OrderStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Stores {
            seats: Arc::new(memory::MemorySeatStore::new()),
            holds: Arc::new(memory::MemoryHoldStore::new()),
            orders: Arc::new(memory::MemoryOrderStore::new()),
            events: Arc::new(memory::MemoryEventStore::new()),
        }
    }

    pub async fn postgres(url: &str, pool_size: u32) -> Result<Self> {
        let pool = postgres::connect(url, pool_size).await?;
        postgres::ensure_schema(&pool).await?;
        Ok(Stores {
            seats: Arc::new(postgres::PgSeatStore::new(pool.clone())),
            holds: Arc::new(postgres::PgHoldStore::new(pool.clone())),
            orders: Arc::new(postgres::PgOrderStore::new(pool.clone())),
            events: Arc::new(postgres::PgEventStore::new(pool)),
        })
    }

    /// Event publish: insert the event and bulk-create one AVAILABLE seat
    /// row per entry in the venue's seat index.
    pub async fn publish_event(&self, event: &Event) -> Result<()> {
        let now = Utc::now();
        self.events.insert(event).await?;
        let rows = event
            .seat_index()
            .iter()
            .map(|seat_id| SeatState::available(&event.id, seat_id, now))
            .collect();
        self.seats.insert_all(rows).await
    }
}
