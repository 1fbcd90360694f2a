//! Shared fixtures for the scenario and invariant suites.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use boxoffice::config::Config;
use boxoffice::models::{
    CustomerInfo, Event, EventStatus, PricingZone, SeatPosition, VenueSection,
};
use boxoffice::store::memory::{
    MemoryEventStore, MemoryHoldStore, MemoryOrderStore, MemorySeatStore,
};
use boxoffice::store::Stores;
use boxoffice::AppState;

/// In-memory stores with a handle on the concrete seat store so tests can
/// force store-level anomalies.
pub struct TestHarness {
    pub state: AppState,
    pub seat_store: Arc<MemorySeatStore>,
}

pub fn harness() -> TestHarness {
    harness_with_config(Config::for_tests())
}

pub fn harness_with_config(config: Config) -> TestHarness {
    let seat_store = Arc::new(MemorySeatStore::new());
    let stores = Stores {
        seats: seat_store.clone(),
        holds: Arc::new(MemoryHoldStore::new()),
        orders: Arc::new(MemoryOrderStore::new()),
        events: Arc::new(MemoryEventStore::new()),
    };
    TestHarness {
        state: AppState::with_stores(config, stores),
        seat_store,
    }
}

/// Published event with one pricing zone per distinct seat section.
pub fn event_fixture(event_id: &str, seat_ids: &[&str], price: f64) -> Event {
    let mut sections: Vec<VenueSection> = Vec::new();
    let mut zones = HashMap::new();
    for (i, seat_id) in seat_ids.iter().enumerate() {
        let section_code = seat_id.split('-').next().unwrap().to_string();
        zones.entry(section_code.clone()).or_insert(PricingZone {
            name: format!("Zone {}", section_code),
            price,
            currency: "USD".to_string(),
        });
        let position = SeatPosition {
            seat_id: seat_id.to_string(),
            x: (i as f64) * 10.0,
            y: 0.0,
        };
        match sections.iter().position(|s| s.code == section_code) {
            Some(idx) => sections[idx].seats.push(position),
            None => sections.push(VenueSection {
                name: format!("Section {}", section_code),
                code: section_code,
                seats: vec![position],
            }),
        }
    }
    Event {
        id: event_id.to_string(),
        name: format!("Test event {}", event_id),
        status: EventStatus::Published,
        starts_at: Utc::now() + Duration::days(30),
        pricing_zones: zones,
        sections,
        seat_map_svg: None,
        sold_count: 0,
    }
}

pub async fn publish(harness: &TestHarness, event_id: &str, seat_ids: &[&str], price: f64) {
    harness
        .state
        .stores
        .publish_event(&event_fixture(event_id, seat_ids, price))
        .await
        .expect("event publish failed");
}

pub fn customer(email: &str) -> CustomerInfo {
    CustomerInfo {
        email: email.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        phone: None,
    }
}

pub fn seats(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}
