//! Property-style checks for the reservation invariants: no double-sell,
//! hold exclusivity, conservation, idempotent finalize, webhook idempotence.

mod common;

use std::collections::HashMap;

use boxoffice::models::{Order, PaymentStatus, PriceBreakdown, SeatStatus};
use boxoffice::services::orders::CheckoutRequest;

use common::{customer, harness, publish, seats};

fn pending_order(event_id: &str, seat_ids: &[&str], intent: &str, session: Option<&str>) -> Order {
    Order::pending(
        event_id,
        seats(seat_ids),
        customer("buyer@example.com"),
        session.map(str::to_string),
        None,
        intent.to_string(),
        PriceBreakdown {
            subtotal: 10.0,
            fees: 0.5,
            tax: 0.8,
            total: 11.3,
        },
        chrono::Utc::now(),
    )
}

// ---------------------------------------------------------------------------
// Invariant 1: no double-sell under concurrent finalize
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_finalizes_sell_a_seat_exactly_once() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1"], 10.0).await;

    let mut order_ids = Vec::new();
    for i in 0..8 {
        let order = pending_order("E1", &["A-R1-S1"], &format!("pi_race_{}", i), None);
        h.state.stores.orders.insert(&order).await.unwrap();
        order_ids.push(order.id);
    }

    let mut tasks = Vec::new();
    for order_id in &order_ids {
        let svc = h.state.orders.clone();
        let order_id = order_id.clone();
        tasks.push(tokio::spawn(
            async move { svc.finalize_order(&order_id).await },
        ));
    }

    let mut succeeded = Vec::new();
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(order) => succeeded.push(order),
            Err(e) => {
                assert_eq!(e.kind(), "SEAT_CONFLICT");
                conflicts += 1;
            }
        }
    }

    assert_eq!(succeeded.len(), 1, "exactly one finalize must win");
    assert_eq!(conflicts, 7);

    let winner = &succeeded[0];
    let row = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.status, SeatStatus::Sold);
    assert_eq!(row.order_ref.as_deref(), Some(winner.id.as_str()));

    // Every losing order stayed PENDING with no tickets.
    for order_id in &order_ids {
        let order = h.state.orders.get_order(order_id).await.unwrap();
        if order.id == winner.id {
            assert_eq!(order.payment_status, PaymentStatus::Succeeded);
            assert_eq!(order.tickets.len(), 1);
        } else {
            assert_eq!(order.payment_status, PaymentStatus::Pending);
            assert!(order.tickets.is_empty());
        }
    }

    let event = h.state.stores.events.get("E1").await.unwrap().unwrap();
    assert_eq!(event.sold_count, 1);
}

// ---------------------------------------------------------------------------
// Invariants 2 and 3: all-or-nothing grants, no shared seats between holds
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn contending_grants_never_share_seats() {
    let h = harness();
    let seat_ids = ["A-R1-S1", "A-R1-S2", "A-R1-S3", "A-R1-S4", "A-R1-S5"];
    publish(&h, "E1", &seat_ids, 10.0).await;

    // Ten sessions race for overlapping pairs.
    let mut tasks = Vec::new();
    for i in 0..10usize {
        let svc = h.state.seats.clone();
        let pair = vec![
            seat_ids[i % 5].to_string(),
            seat_ids[(i + 1) % 5].to_string(),
        ];
        let session = format!("sess{}", i);
        tasks.push(tokio::spawn(async move {
            svc.hold_seats("E1", &pair, &session, None).await
        }));
    }

    let mut granted = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(hold) => granted.push(hold),
            Err(e) => assert_eq!(e.kind(), "SEAT_CONFLICT"),
        }
    }

    // Progress: if every racer rolled back, an uncontended retry must win.
    if granted.is_empty() {
        let hold = h
            .state
            .seats
            .hold_seats("E1", &seats(&["A-R1-S1"]), "sess-final", None)
            .await
            .expect("uncontended grant must succeed");
        granted.push(hold);
    }

    // Each granted hold fully owns its seats (all-or-nothing, I5).
    let mut owner_of: HashMap<String, String> = HashMap::new();
    for hold in &granted {
        let rows = h
            .state
            .stores
            .seats
            .get_many("E1", &hold.seat_ids)
            .await
            .unwrap();
        assert_eq!(rows.len(), hold.seat_ids.len());
        for row in rows {
            assert_eq!(row.status, SeatStatus::Held);
            assert_eq!(row.hold_ref.as_deref(), Some(hold.id.as_str()));
            // No two live holds may claim the same seat (I6/exclusivity).
            let prev = owner_of.insert(row.seat_id.clone(), hold.id.clone());
            assert!(prev.is_none(), "seat {} owned by two holds", row.seat_id);
        }
    }

    // Conservation: AVAILABLE + HELD + SOLD = capacity.
    let event = h.state.stores.events.get("E1").await.unwrap().unwrap();
    let all = h.state.stores.seats.list_for_event("E1").await.unwrap();
    assert_eq!(all.len(), event.total_capacity());
    let held = all.iter().filter(|r| r.status == SeatStatus::Held).count();
    let available = all
        .iter()
        .filter(|r| r.status == SeatStatus::Available)
        .count();
    let sold = all.iter().filter(|r| r.status == SeatStatus::Sold).count();
    assert_eq!(held + available + sold, event.total_capacity());

    // Every HELD row's hold_ref resolves to a live hold that lists it.
    for row in all.iter().filter(|r| r.status == SeatStatus::Held) {
        let hold_id = row.hold_ref.clone().expect("HELD row must carry hold_ref");
        let hold = h
            .state
            .stores
            .holds
            .get(&hold_id)
            .await
            .unwrap()
            .expect("HELD row must reference an existing hold");
        assert!(hold.seat_ids.contains(&row.seat_id));
    }
}

// ---------------------------------------------------------------------------
// Invariant 5: idempotent finalize
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finalize_twice_returns_the_same_order() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1"], 10.0).await;

    h.state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();

    let order = pending_order("E1", &["A-R1-S1"], "pi_idem", Some("sess1"));
    h.state.stores.orders.insert(&order).await.unwrap();

    let first = h.state.orders.finalize_order(&order.id).await.unwrap();
    let second = h.state.orders.finalize_order(&order.id).await.unwrap();

    assert_eq!(first.payment_status, PaymentStatus::Succeeded);
    assert_eq!(second.payment_status, PaymentStatus::Succeeded);
    assert_eq!(first.tickets.len(), 1);
    // No re-issue: the ticket codes are identical.
    assert_eq!(first.tickets[0].code, second.tickets[0].code);

    let event = h.state.stores.events.get("E1").await.unwrap().unwrap();
    assert_eq!(event.sold_count, 1);
}

// ---------------------------------------------------------------------------
// Invariant 6: webhook idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_success_webhooks_issue_tickets_once() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1", "A-R1-S2"], 10.0).await;

    let order = pending_order("E1", &["A-R1-S1", "A-R1-S2"], "pi_dup", None);
    h.state.stores.orders.insert(&order).await.unwrap();

    let first = h.state.orders.on_payment_success("pi_dup").await.unwrap();
    let second = h.state.orders.on_payment_success("pi_dup").await.unwrap();

    assert_eq!(first.payment_status, PaymentStatus::Succeeded);
    assert_eq!(first.tickets.len(), 2);
    assert_eq!(
        first.tickets.iter().map(|t| &t.code).collect::<Vec<_>>(),
        second.tickets.iter().map(|t| &t.code).collect::<Vec<_>>()
    );

    let event = h.state.stores.events.get("E1").await.unwrap().unwrap();
    assert_eq!(event.sold_count, 2);
}

// ---------------------------------------------------------------------------
// Payment failure keeps seats held; FAILED is terminal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_webhook_keeps_seats_held_and_is_terminal() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1"], 10.0).await;

    let hold = h
        .state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();

    let order = pending_order("E1", &["A-R1-S1"], "pi_fail", None);
    h.state.stores.orders.insert(&order).await.unwrap();

    let failed = h.state.orders.on_payment_failure("pi_fail").await.unwrap();
    assert_eq!(failed.payment_status, PaymentStatus::Failed);

    // Seats are not released eagerly; the TTL reclaims them.
    let row = h
        .state
        .stores
        .seats
        .get_many("E1", &seats(&["A-R1-S1"]))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(row.status, SeatStatus::Held);
    assert_eq!(row.hold_ref.as_deref(), Some(hold.id.as_str()));

    // A late success delivery cannot resurrect a FAILED order.
    let err = h
        .state
        .orders
        .on_payment_success("pi_fail")
        .await
        .expect_err("finalize on a FAILED order must be rejected");
    assert_eq!(err.kind(), "INVALID_STATE");
}

// ---------------------------------------------------------------------------
// Checkout ownership: a live foreign hold blocks the intent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkout_rejects_seats_held_by_another_session() {
    let h = harness();
    publish(&h, "E1", &["A-R1-S1"], 10.0).await;

    h.state
        .seats
        .hold_seats("E1", &seats(&["A-R1-S1"]), "sess1", None)
        .await
        .unwrap();

    let err = h
        .state
        .orders
        .create_checkout_intent(CheckoutRequest {
            event_id: "E1".to_string(),
            seat_ids: seats(&["A-R1-S1"]),
            customer: customer("b@c"),
            session_id: Some("sess2".to_string()),
            user_id: None,
        })
        .await
        .expect_err("foreign live hold must block checkout");
    assert_eq!(err.kind(), "SEAT_CONFLICT");
}
