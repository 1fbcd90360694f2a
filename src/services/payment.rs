//! Payment authority client.
//!
//! Wraps the external payment-intent API behind a circuit breaker so a dead
//! provider fails fast instead of tying up request tasks. The provider is
//! optional: with no key configured the checkout coordinator runs in
//! mock-succeed mode and this client is never constructed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::config::PaymentConfig;
use crate::error::{Error, Result};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests allowed.
    Closed,
    /// Blocking requests after repeated failures.
    Open,
    /// Timeout elapsed; one probe request is allowed through.
    HalfOpen,
}

/// Gate in front of the provider HTTP calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: std::sync::RwLock<CircuitState>,
    failure_count: AtomicU32,
    /// Unix seconds of the most recent failure.
    last_failure_time: AtomicU64,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: std::sync::RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure_time: AtomicU64::new(0),
            failure_threshold,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn can_execute(&self) -> bool {
        let state = *self.state.read().unwrap();
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = chrono::Utc::now().timestamp() as u64;
                let last_failure = self.last_failure_time.load(Ordering::Relaxed);
                if now.saturating_sub(last_failure) >= self.timeout.as_secs() {
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    info!("circuit breaker transitioning to half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Closed;
                self.failure_count.store(0, Ordering::Relaxed);
                info!("circuit breaker recovered, closed");
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure_time
            .store(chrono::Utc::now().timestamp() as u64, Ordering::Relaxed);

        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => {
                if failures >= self.failure_threshold {
                    *state = CircuitState::Open;
                    error!(failures, threshold = self.failure_threshold, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }
}

#[derive(Debug, Serialize)]
struct CreateIntentRequest<'a> {
    amount: i64,
    currency: &'a str,
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: Option<String>,
}

/// HTTP client for the payment-intent API.
#[derive(Clone)]
pub struct PaymentProvider {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    breaker: Arc<CircuitBreaker>,
}

impl PaymentProvider {
    /// Built only when a provider key is configured.
    pub fn from_config(config: &PaymentConfig) -> Option<Self> {
        let key = config.provider_key.clone()?;
        Some(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build http client"),
            base_url: config.provider_url.clone(),
            secret_key: key,
            breaker: Arc::new(CircuitBreaker::new(
                config.circuit_failure_threshold,
                config.circuit_timeout_seconds,
            )),
        })
    }

    /// Create an intent for `amount_minor` minor currency units.
    pub async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent> {
        if !self.breaker.can_execute() {
            warn!("circuit breaker open, refusing payment intent request");
            return Err(Error::ExternalUnavailable(
                "Payment service temporarily unavailable. Please try again later.".to_string(),
            ));
        }

        let request = CreateIntentRequest {
            amount: amount_minor,
            currency,
            metadata: &metadata,
        };

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("payment intent request failed: {}", e);
                self.breaker.record_failure();
                return Err(Error::ExternalUnavailable(
                    "Payment gateway connection error".to_string(),
                ));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            self.breaker.record_failure();
            error!(%status, "payment provider rejected intent");
            return Err(Error::ExternalUnavailable(format!(
                "Payment provider returned {}",
                status
            )));
        }

        match response.json::<PaymentIntent>().await {
            Ok(intent) => {
                self.breaker.record_success();
                info!(intent_id = %intent.id, amount_minor, "payment intent created");
                Ok(intent)
            }
            Err(e) => {
                self.breaker.record_failure();
                error!("malformed payment intent response: {}", e);
                Err(Error::ExternalUnavailable(
                    "Malformed payment provider response".to_string(),
                ))
            }
        }
    }

}

/// Webhook authenticity check: hex SHA-256 over `secret || raw_body`,
/// compared against the provider's signature header.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    let expected = format!("{:x}", hasher.finalize());
    expected == signature.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, 60);
        assert!(breaker.can_execute());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.current_state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.current_state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn breaker_half_open_probe_recovers_on_success() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.current_state(), CircuitState::Open);

        // Zero timeout: the next check allows a probe.
        assert!(breaker.can_execute());
        assert_eq!(breaker.current_state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }

    #[test]
    fn breaker_failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(breaker.current_state(), CircuitState::Open);
    }

    #[test]
    fn webhook_signature_round_trip() {
        let secret = "whsec_test";
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(body);
        let signature = format!("{:x}", hasher.finalize());

        assert!(verify_webhook_signature(secret, body, &signature));
        assert!(!verify_webhook_signature(secret, body, "deadbeef"));
        assert!(!verify_webhook_signature("other", body, &signature));
    }
}
