use serde::Deserialize;
use std::env;

// Top-level configuration container, one struct per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub reservation: ReservationConfig,
    pub payment: PaymentConfig,
}

// HTTP host process settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

// Durable store settings; url absent => in-memory mode
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

// Side-channel cache settings; url absent => cache disabled
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Hold lifecycle knobs
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    /// Hold TTL in minutes from the last grant or extension.
    pub hold_expiry_minutes: i64,
    /// Seat count cap for a single hold.
    pub max_seats_per_hold: usize,
    /// Hold-grant requests allowed per session per minute.
    pub max_holds_per_minute: u32,
    /// Expiration worker tick period in seconds.
    pub worker_period_seconds: u64,
    /// Expired holds processed per worker tick.
    pub worker_page_size: usize,
}

// External payment authority settings; key absent => mock-succeed mode
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub provider_key: Option<String>,
    pub provider_url: String,
    pub webhook_secret: Option<String>,
    pub circuit_failure_threshold: u32,
    pub circuit_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "boxoffice=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            },
            reservation: ReservationConfig {
                hold_expiry_minutes: env::var("SEAT_HOLD_EXPIRY_MINUTES")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("SEAT_HOLD_EXPIRY_MINUTES must be a valid number"),
                max_seats_per_hold: env::var("SEAT_HOLD_MAX_PER_HOLD")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("SEAT_HOLD_MAX_PER_HOLD must be a valid number"),
                max_holds_per_minute: env::var("SEAT_HOLD_MAX_PER_MINUTE")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("SEAT_HOLD_MAX_PER_MINUTE must be a valid number"),
                worker_period_seconds: env::var("EXPIRATION_WORKER_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("EXPIRATION_WORKER_SECONDS must be a valid number"),
                worker_page_size: env::var("EXPIRATION_WORKER_PAGE_SIZE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .expect("EXPIRATION_WORKER_PAGE_SIZE must be a valid number"),
            },
            payment: PaymentConfig {
                provider_key: env::var("PAYMENT_PROVIDER_KEY").ok().filter(|k| !k.is_empty()),
                provider_url: env::var("PAYMENT_PROVIDER_URL")
                    .unwrap_or_else(|_| "https://payment-provider.api".to_string()),
                webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
                circuit_failure_threshold: env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be a valid number"),
                circuit_timeout_seconds: env::var("CIRCUIT_BREAKER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_TIMEOUT_SECONDS must be a valid number"),
            },
        }
    }

    /// Config for tests and demos: in-memory stores, no external services.
    pub fn for_tests() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                rust_log: "boxoffice=debug".to_string(),
            },
            database: DatabaseConfig { url: None, pool_size: 5 },
            redis: RedisConfig { url: None },
            reservation: ReservationConfig {
                hold_expiry_minutes: 10,
                max_seats_per_hold: 10,
                max_holds_per_minute: 5,
                worker_period_seconds: 60,
                worker_page_size: 100,
            },
            payment: PaymentConfig {
                provider_key: None,
                provider_url: "http://127.0.0.1:9099".to_string(),
                webhook_secret: None,
                circuit_failure_threshold: 5,
                circuit_timeout_seconds: 60,
            },
        }
    }
}
