//! Boundary throttling for hold grants.
//!
//! A fixed one-minute window per session id caps how often a client can ask
//! for holds. Applied only to the grant route; everything else is unmetered
//! here.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Entries kept before a prune pass sweeps stale windows.
const PRUNE_THRESHOLD: usize = 10_000;

pub struct HoldRateLimiter {
    max_per_minute: u32,
    windows: Mutex<HashMap<String, (DateTime<Utc>, u32)>>,
}

impl HoldRateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one grant attempt for `session_id`; errors once the window is
    /// exhausted.
    pub async fn check(&self, session_id: &str) -> Result<()> {
        let now = Utc::now();
        let mut windows = self.windows.lock().await;

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, (start, _)| now - *start < Duration::minutes(1));
        }

        let entry = windows
            .entry(session_id.to_string())
            .or_insert((now, 0));
        if now - entry.0 >= Duration::minutes(1) {
            *entry = (now, 0);
        }
        entry.1 += 1;
        if entry.1 > self.max_per_minute {
            return Err(Error::RateLimited(
                "Too many hold requests. Please wait a moment and try again.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_throttles() {
        let limiter = HoldRateLimiter::new(3);
        for _ in 0..3 {
            limiter.check("sess1").await.unwrap();
        }
        let err = limiter.check("sess1").await.unwrap_err();
        assert_eq!(err.kind(), "RATE_LIMITED");
    }

    #[tokio::test]
    async fn sessions_are_throttled_independently() {
        let limiter = HoldRateLimiter::new(1);
        limiter.check("sess1").await.unwrap();
        limiter.check("sess2").await.unwrap();
        assert!(limiter.check("sess1").await.is_err());
    }
}
