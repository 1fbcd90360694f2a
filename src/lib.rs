pub mod cache;
pub mod config;
pub mod controllers;
pub mod error;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod services;
pub mod store;

use std::sync::Arc;
use tracing::info;

use crate::cache::HoldCache;
use crate::config::Config;
use crate::middleware::HoldRateLimiter;
use crate::realtime::EventRooms;
use crate::services::mailer::{LogMailer, Mailer};
use crate::services::orders::OrderService;
use crate::services::payment::PaymentProvider;
use crate::services::seats::SeatService;
use crate::store::Stores;

// Shared state for the whole application; cheap to clone into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub cache: HoldCache,
    pub rooms: Arc<EventRooms>,
    pub seats: SeatService,
    pub orders: OrderService,
    pub hold_limiter: Arc<HoldRateLimiter>,
}

impl AppState {
    pub async fn new(config: Config) -> crate::error::Result<Self> {
        let stores = match &config.database.url {
            Some(url) => Stores::postgres(url, config.database.pool_size).await?,
            None => {
                info!("no DATABASE_URL configured, running on in-memory stores");
                Stores::in_memory()
            }
        };
        let cache = HoldCache::connect(config.redis.url.as_deref()).await;
        Ok(Self::assemble(config, stores, cache, Arc::new(LogMailer)))
    }

    /// Wire the services over externally supplied stores; used by tests and
    /// demo fixtures.
    pub fn with_stores(config: Config, stores: Stores) -> Self {
        Self::assemble(config, stores, HoldCache::disabled(), Arc::new(LogMailer))
    }

    fn assemble(
        config: Config,
        stores: Stores,
        cache: HoldCache,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let rooms = Arc::new(EventRooms::new());
        let provider = PaymentProvider::from_config(&config.payment);
        if provider.is_none() {
            info!("no PAYMENT_PROVIDER_KEY configured, checkout runs in mock-succeed mode");
        }
        let seats = SeatService::new(
            stores.clone(),
            cache.clone(),
            rooms.clone(),
            config.reservation.clone(),
        );
        let orders = OrderService::new(
            stores.clone(),
            provider,
            rooms.clone(),
            mailer,
            cache.clone(),
        );
        let hold_limiter = Arc::new(HoldRateLimiter::new(config.reservation.max_holds_per_minute));
        AppState {
            config,
            stores,
            cache,
            rooms,
            seats,
            orders,
            hold_limiter,
        }
    }
}
