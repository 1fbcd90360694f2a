//! End-to-end reservation scenarios against in-memory stores, with a
//! subscribed room receiver standing in for connected clients.

mod common;

use boxoffice::config::Config;
use boxoffice::models::{PaymentStatus, SeatStatus};
use boxoffice::realtime::{event_room, RealtimeMessage};
use boxoffice::services::expiration::ExpirationWorker;
use boxoffice::services::orders::CheckoutRequest;

use common::{customer, harness, harness_with_config, publish, seats};

// ---------------------------------------------------------------------------
// S1: happy path, mock payment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_happy_path_with_mock_payment() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2", "A-R1-S3"], 10.0).await;
    let mut rx = h.state.rooms.subscribe(&event_room("E1")).await;

    let hold = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .expect("hold should succeed");
    assert_eq!(hold.seat_ids, vec!["A-R1-S1".to_string()]);

    let (order, client_secret) = h
        .state
        .orders
        .create_checkout_intent(CheckoutRequest {
            event_id: "E1".to_string(),
            seat_ids: seats(&["A-R1-S1"]),
            customer: customer("a@b"),
            session_id: Some("sess1".to_string()),
            user_id: None,
        })
        .await
        .expect("mock checkout should succeed");

    // Mock mode finalizes synchronously.
    assert!(client_secret.is_none());
    assert_eq!(order.payment_status, PaymentStatus::Succeeded);
    assert_eq!(order.tickets.len(), 1);
    assert_eq!(order.tickets[0].seat_id, "A-R1-S1");
    assert_eq!(order.breakdown.subtotal, 10.0);
    assert_eq!(order.breakdown.total, 11.3);
    assert!(order.payment_intent_id.starts_with("pi_mock_"));

    let event = h.state.stores.events.get("E1").await.unwrap().unwrap();
    assert_eq!(event.sold_count, 1);

    let rows = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap();
    assert_eq!(rows[0].status, SeatStatus::Sold);
    assert_eq!(rows[0].order_ref.as_deref(), Some(order.id.as_str()));

    // One broadcast per transition: HELD then SOLD.
    match rx.recv().await.unwrap() {
        RealtimeMessage::SeatAvailabilityUpdate { updates, .. } => {
            assert_eq!(updates[0].seat_id, "A-R1-S1");
            assert_eq!(updates[0].status, SeatStatus::Held);
        }
        other => panic!("expected availability update, got {:?}", other),
    }
    match rx.recv().await.unwrap() {
        RealtimeMessage::SeatAvailabilityUpdate { updates, .. } => {
            assert_eq!(updates[0].seat_id, "A-R1-S1");
            assert_eq!(updates[0].status, SeatStatus::Sold);
        }
        other => panic!("expected availability update, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// S2: two sessions race one seat
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn s2_two_sessions_race_one_seat() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2", "A-R1-S3"], 10.0).await;

    let svc1 = h.state.seats.clone();
    let svc2 = h.state.seats.clone();
    let t1 = tokio::spawn(async move {
        svc1.hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None).await
    });
    let t2 = tokio::spawn(async move {
        svc2.hold_seats("E1", &seats(&["A-R1-S1"]), "sess2", None).await
    });

    let r1 = t1.await.unwrap();
    let r2 = t2.await.unwrap();

    let (winner, loser) = match (&r1, &r2) {
        (Ok(h), Err(e)) => (h.clone(), e.kind()),
        (Err(e), Ok(h)) => (h.clone(), e.kind()),
        other => panic!("exactly one grant must win, got {:?}", other),
    };
    assert_eq!(loser, "SEAT_CONFLICT");

    let rows = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap();
    assert_eq!(rows[0].status, SeatStatus::Held);
    assert_eq!(rows[0].hold_ref.as_deref(), Some(winner.id.as_str()));
}

// ---------------------------------------------------------------------------
// S3: partial hold rollback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s3_partial_hold_rolls_back_entirely() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2", "A-R1-S3"], 10.0).await;

    h.state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1", "A-R1-S2"]), "sess1", None)
        .await
        .expect("first hold should succeed");

    let err = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S2", "A-R1-S3"]), "sess2", None)
        .await
        .expect_err("overlapping hold must fail");
    assert_eq!(err.kind(), "SEAT_CONFLICT");

    // No partial grant for sess2: the free seat stayed free.
    let rows = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S3"]))
        .await
        .unwrap();
    assert_eq!(rows[0].status, SeatStatus::Available);
    assert!(rows[0].hold_ref.is_none());

    assert!(h
        .state
        .stores
        .holds
        .find_by_session("E1", "sess2")
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// S4: hold extension merges seats and refreshes the TTL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s4_same_session_extends_its_hold() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2", "A-R1-S3"], 10.0).await;

    let first = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();

    let extended = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S2"]), "sess1", None)
        .await
        .unwrap();

    assert_eq!(extended.id, first.id);
    assert_eq!(
        extended.seat_ids,
        vec!["A-R1-S1".to_string(), "A-R1-S2".to_string()]
    );
    assert!(extended.expires_at >= first.expires_at);

    // Re-requesting an already-held seat is idempotent.
    let again = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.seat_ids.len(), 2);
}

// ---------------------------------------------------------------------------
// S5: expiration worker reclaims a lapsed hold
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s5_expiration_reclaims_lapsed_hold() {
    let mut config = Config::for_tests();
    config.reservation.hold_expiry_minutes = 0;
    let h = harness_with_config(config);
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2", "A-R1-S3"], 10.0).await;

    let hold = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let mut rx = h.state.rooms.subscribe(&event_room("E1")).await;
    let worker = ExpirationWorker::new(
        h.state.stores.clone(),
        h.state.cache.clone(),
        h.state.rooms.clone(),
        &h.state.config.reservation,
    );
    assert_eq!(worker.tick().await, 1);

    let rows = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap();
    assert_eq!(rows[0].status, SeatStatus::Available);
    assert!(rows[0].hold_ref.is_none());
    assert!(h.state.stores.holds.get(&hold.id).await.unwrap().is_none());

    // Availability update plus the dedicated expiry notice.
    match rx.recv().await.unwrap() {
        RealtimeMessage::SeatAvailabilityUpdate { updates, .. } => {
            assert_eq!(updates[0].status, SeatStatus::Available);
        }
        other => panic!("expected availability update, got {:?}", other),
    }
    match rx.recv().await.unwrap() {
        RealtimeMessage::HoldExpired { seat_ids, .. } => {
            assert_eq!(seat_ids, vec!["A-R1-S1".to_string()]);
        }
        other => panic!("expected hold_expired, got {:?}", other),
    }

    // The seat is grabbable again by a new session.
    let rehold = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess2", None)
        .await
        .expect("seat must be holdable after reclamation");
    assert_ne!(rehold.id, hold.id);
}

// ---------------------------------------------------------------------------
// S6: finalize after someone else sold the seat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s6_finalize_conflicts_when_seat_sold_elsewhere() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2", "A-R1-S3"], 10.0).await;

    h.state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();

    // Build a PENDING order the way a provider-backed checkout would.
    let order = boxoffice::models::Order::pending(
        "E1",
        seats(&["A-R1-S1"]),
        customer("a@b"),
        Some("sess1".to_string()),
        None,
        "pi_test_s6".to_string(),
        boxoffice::models::PriceBreakdown {
            subtotal: 10.0,
            fees: 0.5,
            tax: 0.8,
            total: 11.3,
        },
        chrono::Utc::now(),
    );
    h.state.stores.orders.insert(&order).await.unwrap();

    // Store-level anomaly: the seat was sold under a different order.
    let mut row = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap()
        .remove(0);
    row.status = SeatStatus::Sold;
    row.hold_ref = None;
    row.order_ref = Some("some-other-order".to_string());
    h.seat_store.force_put(row).await;

    let err = h
        .state
        .orders
        .finalize_order(&order.id)
        .await
        .expect_err("finalize must lose the race");
    assert_eq!(err.kind(), "SEAT_CONFLICT");

    let after = h.state.orders.get_order(&order.id).await.unwrap();
    assert_eq!(after.payment_status, PaymentStatus::Pending);
    assert!(after.tickets.is_empty());

    let row = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.order_ref.as_deref(), Some("some-other-order"));
}
