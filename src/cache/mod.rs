//! Side-channel mirror of live holds.
//!
//! Keyed `hold:{id}` with TTL equal to the hold's remaining lifetime. Never
//! authoritative: every state decision consults the seat store, this only
//! serves presentation reads ("is my hold still alive?"). With no redis
//! configured, or on any redis error, callers fall through to the store.

use chrono::Utc;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::{info, warn};

use crate::models::SeatHold;

#[derive(Clone)]
pub struct HoldCache {
    conn: Option<MultiplexedConnection>,
}

fn hold_key(hold_id: &str) -> String {
    format!("hold:{}", hold_id)
}

impl HoldCache {
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    /// Connects when a url is configured; any failure degrades to disabled.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else {
            info!("hold cache disabled (no REDIS_URL)");
            return Self::disabled();
        };
        match Client::open(url) {
            Ok(client) => match client.get_multiplexed_tokio_connection().await {
                Ok(conn) => {
                    info!("hold cache connected");
                    Self { conn: Some(conn) }
                }
                Err(e) => {
                    warn!("hold cache unavailable, running without it: {}", e);
                    Self::disabled()
                }
            },
            Err(e) => {
                warn!("invalid redis url, running without hold cache: {}", e);
                Self::disabled()
            }
        }
    }

    /// Mirror a live hold; TTL matches its expiry.
    pub async fn put(&self, hold: &SeatHold) {
        let Some(conn) = &self.conn else { return };
        let ttl = (hold.expires_at - Utc::now()).num_seconds();
        if ttl <= 0 {
            return;
        }
        let Ok(payload) = serde_json::to_string(hold) else { return };
        let mut conn = conn.clone();
        let result: Result<(), _> = conn.set_ex(hold_key(&hold.id), payload, ttl as u64).await;
        if let Err(e) = result {
            warn!(hold_id = %hold.id, "hold cache write failed: {}", e);
        }
    }

    pub async fn get(&self, hold_id: &str) -> Option<SeatHold> {
        let conn = self.conn.as_ref()?;
        let mut conn = conn.clone();
        let raw: Option<String> = conn.get(hold_key(hold_id)).await.ok().flatten();
        raw.and_then(|json| serde_json::from_str(&json).ok())
    }

    pub async fn remove(&self, hold_id: &str) {
        let Some(conn) = &self.conn else { return };
        let mut conn = conn.clone();
        let result: Result<(), _> = conn.del(hold_key(hold_id)).await;
        if let Err(e) = result {
            warn!(hold_id = %hold_id, "hold cache delete failed: {}", e);
        }
    }
}
