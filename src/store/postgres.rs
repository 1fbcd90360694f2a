//! Postgres store backends.
//!
//! Every mutation is a conditional `UPDATE ... WHERE status = ...` with
//! `version = version + 1`; `rows_affected()` is the modified count the
//! arbitration logic compares against. Nested order/event payloads are
//! stored as serialized JSON text columns; queried fields stay flat.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use crate::models::{
    CustomerInfo, Event, EventStatus, Order, PaymentStatus, PriceBreakdown, PricingZone,
    SeatHold, SeatState, SeatStatus, Ticket, VenueSection,
};

use super::{EventStore, HoldStore, OrderStore, SeatStore};

pub async fn connect(url: &str, pool_size: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .idle_timeout(std::time::Duration::from_secs(300))
        .connect(url)
        .await
        .map_err(|e| Error::Internal(format!("database connection failed: {}", e)))
}

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seat_states (
            event_id     TEXT NOT NULL,
            seat_id      TEXT NOT NULL,
            status       TEXT NOT NULL,
            hold_ref     TEXT,
            order_ref    TEXT,
            version      BIGINT NOT NULL DEFAULT 0,
            last_updated TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (event_id, seat_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seat_holds (
            id         TEXT PRIMARY KEY,
            event_id   TEXT NOT NULL,
            session_id TEXT NOT NULL,
            user_id    TEXT,
            seat_ids   TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS seat_holds_session_idx ON seat_holds (event_id, session_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS seat_holds_expiry_idx ON seat_holds (expires_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id                TEXT PRIMARY KEY,
            order_number      TEXT NOT NULL,
            event_id          TEXT NOT NULL,
            session_id        TEXT,
            user_id           TEXT,
            payment_status    TEXT NOT NULL,
            payment_intent_id TEXT NOT NULL,
            total_amount      DOUBLE PRECISION NOT NULL,
            seat_ids          TEXT NOT NULL,
            customer          TEXT NOT NULL,
            breakdown         TEXT NOT NULL,
            tickets           TEXT NOT NULL,
            created_at        TIMESTAMPTZ NOT NULL,
            updated_at        TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS orders_intent_idx ON orders (payment_intent_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            status        TEXT NOT NULL,
            starts_at     TIMESTAMPTZ NOT NULL,
            pricing_zones TEXT NOT NULL,
            sections      TEXT NOT NULL,
            seat_map_svg  TEXT,
            sold_count    BIGINT NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("serialize failed: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Internal(format!("deserialize failed: {}", e)))
}

pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn seat_row(row: &sqlx::postgres::PgRow) -> Result<SeatState> {
    Ok(SeatState {
        event_id: row.get("event_id"),
        seat_id: row.get("seat_id"),
        status: SeatStatus::parse(row.get::<String, _>("status").as_str())?,
        hold_ref: row.get("hold_ref"),
        order_ref: row.get("order_ref"),
        version: row.get("version"),
        last_updated: row.get("last_updated"),
    })
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn insert_all(&self, rows: Vec<SeatState>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                r#"
                INSERT INTO seat_states
                    (event_id, seat_id, status, hold_ref, order_ref, version, last_updated)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (event_id, seat_id) DO NOTHING
                "#,
            )
            .bind(&r.event_id)
            .bind(&r.seat_id)
            .bind(r.status.as_str())
            .bind(&r.hold_ref)
            .bind(&r.order_ref)
            .bind(r.version)
            .bind(r.last_updated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_many(&self, event_id: &str, seat_ids: &[String]) -> Result<Vec<SeatState>> {
        let rows = sqlx::query(
            "SELECT * FROM seat_states WHERE event_id = $1 AND seat_id = ANY($2)",
        )
        .bind(event_id)
        .bind(seat_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(seat_row).collect()
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<SeatState>> {
        let rows = sqlx::query("SELECT * FROM seat_states WHERE event_id = $1 ORDER BY seat_id")
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(seat_row).collect()
    }

    async fn claim_available(
        &self,
        event_id: &str,
        seat_ids: &[String],
        hold_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seat_states
            SET status = 'HELD', hold_ref = $3, version = version + 1, last_updated = $4
            WHERE event_id = $1 AND seat_id = ANY($2) AND status = 'AVAILABLE'
            "#,
        )
        .bind(event_id)
        .bind(seat_ids.to_vec())
        .bind(hold_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn release_held(
        &self,
        event_id: &str,
        hold_id: &str,
        seat_ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let rows = match seat_ids {
            Some(subset) => {
                sqlx::query_scalar::<_, String>(
                    r#"
                    UPDATE seat_states
                    SET status = 'AVAILABLE', hold_ref = NULL, version = version + 1,
                        last_updated = $4
                    WHERE event_id = $1 AND hold_ref = $2 AND status = 'HELD'
                      AND seat_id = ANY($3)
                    RETURNING seat_id
                    "#,
                )
                .bind(event_id)
                .bind(hold_id)
                .bind(subset.to_vec())
                .bind(now)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, String>(
                    r#"
                    UPDATE seat_states
                    SET status = 'AVAILABLE', hold_ref = NULL, version = version + 1,
                        last_updated = $3
                    WHERE event_id = $1 AND hold_ref = $2 AND status = 'HELD'
                    RETURNING seat_id
                    "#,
                )
                .bind(event_id)
                .bind(hold_id)
                .bind(now)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn mark_sold(
        &self,
        event_id: &str,
        seat_ids: &[String],
        order_id: &str,
        allowed_hold: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seat_states
            SET status = 'SOLD', order_ref = $3, hold_ref = NULL, version = version + 1,
                last_updated = $4
            WHERE event_id = $1 AND seat_id = ANY($2)
              AND (status = 'AVAILABLE' OR (status = 'HELD' AND hold_ref = $5))
            "#,
        )
        .bind(event_id)
        .bind(seat_ids.to_vec())
        .bind(order_id)
        .bind(now)
        .bind(allowed_hold)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revert_sold(
        &self,
        event_id: &str,
        seat_ids: &[String],
        order_id: &str,
        restore_hold: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seat_states
            SET status = CASE WHEN $5::TEXT IS NULL THEN 'AVAILABLE' ELSE 'HELD' END,
                hold_ref = $5, order_ref = NULL, version = version + 1, last_updated = $4
            WHERE event_id = $1 AND seat_id = ANY($2) AND status = 'SOLD' AND order_ref = $3
            "#,
        )
        .bind(event_id)
        .bind(seat_ids.to_vec())
        .bind(order_id)
        .bind(now)
        .bind(restore_hold)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

pub struct PgHoldStore {
    pool: PgPool,
}

impl PgHoldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn hold_row(row: &sqlx::postgres::PgRow) -> Result<SeatHold> {
    Ok(SeatHold {
        id: row.get("id"),
        event_id: row.get("event_id"),
        seat_ids: from_json(row.get::<String, _>("seat_ids").as_str())?,
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

#[async_trait]
impl HoldStore for PgHoldStore {
    async fn insert(&self, hold: &SeatHold) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO seat_holds (id, event_id, session_id, user_id, seat_ids, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&hold.id)
        .bind(&hold.event_id)
        .bind(&hold.session_id)
        .bind(&hold.user_id)
        .bind(to_json(&hold.seat_ids)?)
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, hold_id: &str) -> Result<Option<SeatHold>> {
        let row = sqlx::query("SELECT * FROM seat_holds WHERE id = $1")
            .bind(hold_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(hold_row).transpose()
    }

    async fn find_by_session(
        &self,
        event_id: &str,
        session_id: &str,
    ) -> Result<Option<SeatHold>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM seat_holds
            WHERE event_id = $1 AND session_id = $2
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(hold_row).transpose()
    }

    async fn update(&self, hold: &SeatHold) -> Result<()> {
        let result = sqlx::query(
            "UPDATE seat_holds SET seat_ids = $2, expires_at = $3 WHERE id = $1",
        )
        .bind(&hold.id)
        .bind(to_json(&hold.seat_ids)?)
        .bind(hold.expires_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("hold {} not found", hold.id)));
        }
        Ok(())
    }

    async fn delete(&self, hold_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM seat_holds WHERE id = $1")
            .bind(hold_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SeatHold>> {
        let rows = sqlx::query(
            "SELECT * FROM seat_holds WHERE expires_at < $1 ORDER BY expires_at LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(hold_row).collect()
    }

    async fn list_expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<SeatHold>> {
        let rows = sqlx::query(
            "SELECT * FROM seat_holds WHERE expires_at >= $1 AND expires_at < $2",
        )
        .bind(now)
        .bind(now + window)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(hold_row).collect()
    }
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_row(row: &sqlx::postgres::PgRow) -> Result<Order> {
    let status = match row.get::<String, _>("payment_status").as_str() {
        "PENDING" => PaymentStatus::Pending,
        "SUCCEEDED" => PaymentStatus::Succeeded,
        "FAILED" => PaymentStatus::Failed,
        "REFUNDED" => PaymentStatus::Refunded,
        other => return Err(Error::Internal(format!("unknown payment status '{}'", other))),
    };
    Ok(Order {
        id: row.get("id"),
        order_number: row.get("order_number"),
        event_id: row.get("event_id"),
        seat_ids: from_json::<Vec<String>>(row.get::<String, _>("seat_ids").as_str())?,
        customer: from_json::<CustomerInfo>(row.get::<String, _>("customer").as_str())?,
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        payment_status: status,
        payment_intent_id: row.get("payment_intent_id"),
        total_amount: row.get("total_amount"),
        breakdown: from_json::<PriceBreakdown>(row.get::<String, _>("breakdown").as_str())?,
        tickets: from_json::<Vec<Ticket>>(row.get::<String, _>("tickets").as_str())?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, order_number, event_id, session_id, user_id, payment_status,
                 payment_intent_id, total_amount, seat_ids, customer, breakdown,
                 tickets, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.event_id)
        .bind(&order.session_id)
        .bind(&order.user_id)
        .bind(order.payment_status.as_str())
        .bind(&order.payment_intent_id)
        .bind(order.total_amount)
        .bind(to_json(&order.seat_ids)?)
        .bind(to_json(&order.customer)?)
        .bind(to_json(&order.breakdown)?)
        .bind(to_json(&order.tickets)?)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_row).transpose()
    }

    async fn find_by_intent(&self, payment_intent_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE payment_intent_id = $1 LIMIT 1")
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_row).transpose()
    }

    async fn update(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2, tickets = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(&order.id)
        .bind(order.payment_status.as_str())
        .bind(to_json(&order.tickets)?)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("order {} not found", order.id)));
        }
        Ok(())
    }
}

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, name, status, starts_at, pricing_zones, sections, seat_map_svg, sold_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(&event.name)
        .bind(match event.status {
            EventStatus::Draft => "DRAFT",
            EventStatus::Published => "PUBLISHED",
        })
        .bind(event.starts_at)
        .bind(to_json(&event.pricing_zones)?)
        .bind(to_json(&event.sections)?)
        .bind(&event.seat_map_svg)
        .bind(event.sold_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let status = match row.get::<String, _>("status").as_str() {
                    "PUBLISHED" => EventStatus::Published,
                    _ => EventStatus::Draft,
                };
                Ok(Some(Event {
                    id: row.get("id"),
                    name: row.get("name"),
                    status,
                    starts_at: row.get("starts_at"),
                    pricing_zones: from_json::<std::collections::HashMap<String, PricingZone>>(
                        row.get::<String, _>("pricing_zones").as_str(),
                    )?,
                    sections: from_json::<Vec<VenueSection>>(
                        row.get::<String, _>("sections").as_str(),
                    )?,
                    seat_map_svg: row.get("seat_map_svg"),
                    sold_count: row.get("sold_count"),
                }))
            }
            None => Ok(None),
        }
    }

    async fn increment_sold(&self, event_id: &str, count: i64) -> Result<()> {
        let result = sqlx::query("UPDATE events SET sold_count = sold_count + $2 WHERE id = $1")
            .bind(event_id)
            .bind(count)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("event {} not found", event_id)));
        }
        Ok(())
    }
}
