//! Checkout coordinator.
//!
//! Turns a HELD selection into a SOLD order through the external payment
//! authority. Finalize is idempotent and atomic across the order's seats:
//! the conditional flip either covers the whole set (counting seats already
//! sold under this very order as satisfied) or is compensated back out and
//! surfaced as a conflict, leaving the order PENDING.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::HoldCache;
use crate::error::{Error, Result};
use crate::models::{
    CustomerInfo, Order, PaymentStatus, PriceBreakdown, SeatRef, SeatStatus, Ticket,
};
use crate::realtime::EventRooms;
use crate::services::mailer::Mailer;
use crate::services::payment::PaymentProvider;
use crate::store::Stores;

/// Service fee, fraction of the subtotal.
const FEE_RATE: f64 = 0.05;
/// Sales tax, fraction of the subtotal.
const TAX_RATE: f64 = 0.08;

pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub event_id: String,
    pub seat_ids: Vec<String>,
    pub customer: CustomerInfo,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    stores: Stores,
    provider: Option<PaymentProvider>,
    rooms: Arc<EventRooms>,
    mailer: Arc<dyn Mailer>,
    cache: HoldCache,
}

impl OrderService {
    pub fn new(
        stores: Stores,
        provider: Option<PaymentProvider>,
        rooms: Arc<EventRooms>,
        mailer: Arc<dyn Mailer>,
        cache: HoldCache,
    ) -> Self {
        Self {
            stores,
            provider,
            rooms,
            mailer,
            cache,
        }
    }

    /// Whether the call will finalize synchronously instead of waiting for a
    /// webhook. Mock mode exists for tests and demos only: it skips the
    /// PENDING -> webhook -> SUCCEEDED path entirely.
    pub fn is_mock_mode(&self) -> bool {
        self.provider.is_none()
    }

    /// Price the selection, create the external payment intent, persist a
    /// PENDING order. Seats stay HELD; finalize flips them. In mock mode the
    /// order is finalized before returning.
    pub async fn create_checkout_intent(
        &self,
        req: CheckoutRequest,
    ) -> Result<(Order, Option<String>)> {
        let seat_ids: Vec<String> = {
            let mut seen = std::collections::HashSet::new();
            req.seat_ids
                .iter()
                .filter(|s| !s.is_empty() && seen.insert(s.as_str()))
                .cloned()
                .collect()
        };
        if seat_ids.is_empty() {
            return Err(Error::InvalidInput("seatIds must not be empty".to_string()));
        }
        if req.customer.email.is_empty() {
            return Err(Error::InvalidInput("customer email is required".to_string()));
        }

        let event = self
            .stores
            .events
            .get(&req.event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {} not found", req.event_id)))?;
        if !event.is_published() {
            return Err(Error::event_not_bookable());
        }

        let rows = self.stores.seats.get_many(&req.event_id, &seat_ids).await?;
        if rows.len() != seat_ids.len() {
            return Err(Error::NotFound("one or more seats not found".to_string()));
        }

        // Every seat must be AVAILABLE, or HELD by this caller. A live hold
        // belonging to someone else fails the whole call.
        let now = Utc::now();
        for row in &rows {
            match row.status {
                SeatStatus::Available => {}
                SeatStatus::Sold => return Err(Error::seat_conflict(&row.seat_id)),
                SeatStatus::Held => {
                    let hold_ref = row.hold_ref.clone().unwrap_or_default();
                    if let Some(hold) = self.stores.holds.get(&hold_ref).await? {
                        if hold.is_expired(now) {
                            continue;
                        }
                        let session_match = req
                            .session_id
                            .as_deref()
                            .is_some_and(|sid| sid == hold.session_id);
                        let user_match = req.user_id.is_some() && req.user_id == hold.user_id;
                        if !session_match && !user_match {
                            return Err(Error::seat_conflict(&row.seat_id));
                        }
                    }
                    // Hold row gone: the seat is orphaned, not owned by a
                    // competitor; the conditional finalize will arbitrate.
                }
            }
        }

        let breakdown = price_selection(&seat_ids, &event.pricing_zones)?;

        let mut order = Order::pending(
            &req.event_id,
            seat_ids.clone(),
            req.customer,
            req.session_id.clone(),
            req.user_id.clone(),
            String::new(),
            breakdown,
            now,
        );

        let client_secret = match &self.provider {
            Some(provider) => {
                let amount_minor = (breakdown.total * 100.0).round() as i64;
                let mut metadata = HashMap::new();
                metadata.insert("eventId".to_string(), req.event_id.clone());
                metadata.insert("seatIds".to_string(), seat_ids.join(","));
                metadata.insert("orderNumber".to_string(), order.order_number.clone());
                metadata.insert("customerEmail".to_string(), order.customer.email.clone());
                if let Some(sid) = &req.session_id {
                    metadata.insert("sessionId".to_string(), sid.clone());
                }
                if let Some(uid) = &req.user_id {
                    metadata.insert("userId".to_string(), uid.clone());
                }

                let intent = provider
                    .create_intent(amount_minor, "usd", metadata)
                    .await?;
                order.payment_intent_id = intent.id;
                intent.client_secret
            }
            None => {
                order.payment_intent_id = format!("pi_mock_{}", uuid::Uuid::new_v4().simple());
                None
            }
        };

        self.stores.orders.insert(&order).await?;
        info!(
            order_number = %order.order_number,
            total = order.total_amount,
            seats = order.seat_ids.len(),
            mock = self.is_mock_mode(),
            "checkout intent created"
        );

        if self.is_mock_mode() {
            let order = self.finalize_order(&order.id).await?;
            return Ok((order, None));
        }

        Ok((order, client_secret))
    }

    /// Idempotent finalize: flip the order's seats to SOLD, issue tickets,
    /// mark the order SUCCEEDED.
    pub async fn finalize_order(&self, order_id: &str) -> Result<Order> {
        let mut order = self
            .stores
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("order {} not found", order_id)))?;

        match order.payment_status {
            PaymentStatus::Succeeded => return Ok(order),
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                return Err(Error::InvalidState(format!(
                    "order {} is {}",
                    order.order_number,
                    order.payment_status.as_str()
                )))
            }
            PaymentStatus::Pending => {}
        }

        let now = Utc::now();
        // The one hold the flip may consume: whatever this order's session
        // currently owns. Seats held by anyone else stay untouchable.
        let own_hold = match &order.session_id {
            Some(session_id) => self
                .stores
                .holds
                .find_by_session(&order.event_id, session_id)
                .await?
                .map(|h| h.id),
            None => None,
        };

        // Snapshot first: restores the prior state on compensation, and
        // counts seats a crashed earlier attempt already flipped for us.
        let before = self
            .stores
            .seats
            .get_many(&order.event_id, &order.seat_ids)
            .await?;
        let already_ours = before
            .iter()
            .filter(|r| {
                r.status == SeatStatus::Sold && r.order_ref.as_deref() == Some(order.id.as_str())
            })
            .count() as u64;

        let modified = self
            .stores
            .seats
            .mark_sold(
                &order.event_id,
                &order.seat_ids,
                &order.id,
                own_hold.as_deref(),
                now,
            )
            .await?;

        if modified + already_ours != order.seat_ids.len() as u64 {
            // Somebody else owns part of the set. Put back what this call
            // flipped, restoring each seat's prior hold if it had one.
            for row in &before {
                if row.status == SeatStatus::Sold {
                    continue;
                }
                let restore = if row.status == SeatStatus::Held {
                    row.hold_ref.as_deref()
                } else {
                    None
                };
                let seat = std::slice::from_ref(&row.seat_id);
                if let Err(e) = self
                    .stores
                    .seats
                    .revert_sold(&order.event_id, seat, &order.id, restore, now)
                    .await
                {
                    error!(order_id = %order.id, seat_id = %row.seat_id, "finalize compensation failed: {}", e);
                }
            }
            warn!(
                order_id = %order.id,
                expected = order.seat_ids.len(),
                modified,
                "finalize lost the seat race"
            );
            let contended = before
                .iter()
                .find(|r| {
                    r.status == SeatStatus::Sold
                        && r.order_ref.as_deref() != Some(order.id.as_str())
                })
                .map(|r| r.seat_id.clone())
                .unwrap_or_else(|| order.seat_ids[0].clone());
            return Err(Error::seat_conflict(&contended));
        }

        order.tickets = order
            .seat_ids
            .iter()
            .map(|seat_id| Ticket::issue(seat_id, now))
            .collect();
        order.payment_status = PaymentStatus::Succeeded;
        order.updated_at = now;
        self.stores.orders.update(&order).await?;

        if let Err(e) = self
            .stores
            .events
            .increment_sold(&order.event_id, order.seat_ids.len() as i64)
            .await
        {
            warn!(order_id = %order.id, "sold counter update failed: {}", e);
        }

        // The hold is consumed by the sale; its remaining seats are SOLD, so
        // dropping the record cannot strand anything.
        if let Some(hold_id) = &own_hold {
            let _ = self.stores.holds.delete(hold_id).await;
            self.cache.remove(hold_id).await;
        }

        self.rooms
            .publish_seat_updates(&order.event_id, &order.seat_ids, SeatStatus::Sold)
            .await;

        if let Err(e) = self.mailer.send_order_confirmation(&order).await {
            warn!(order_number = %order.order_number, "confirmation mail failed: {}", e);
        }

        info!(
            order_number = %order.order_number,
            tickets = order.tickets.len(),
            "order finalized"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.stores
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("order {} not found", order_id)))
    }

    /// Webhook path for `payment_intent.succeeded`. Idempotent against
    /// duplicate deliveries: finalize short-circuits on SUCCEEDED orders.
    pub async fn on_payment_success(&self, payment_intent_id: &str) -> Result<Order> {
        let order = self
            .stores
            .orders
            .find_by_intent(payment_intent_id)
            .await?
            .ok_or_else(|| {
                warn!(intent_id = %payment_intent_id, "webhook for unknown payment intent");
                Error::NotFound(format!("no order for intent {}", payment_intent_id))
            })?;
        self.finalize_order(&order.id).await
    }

    /// Webhook path for `payment_intent.payment_failed`. Marks the order
    /// FAILED but never releases seats: the hold TTL reclaims them, which
    /// avoids racing a late-arriving success delivery.
    pub async fn on_payment_failure(&self, payment_intent_id: &str) -> Result<Order> {
        let mut order = self
            .stores
            .orders
            .find_by_intent(payment_intent_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("no order for intent {}", payment_intent_id))
            })?;

        if order.payment_status != PaymentStatus::Pending {
            return Ok(order);
        }
        order.payment_status = PaymentStatus::Failed;
        order.updated_at = Utc::now();
        self.stores.orders.update(&order).await?;
        info!(order_number = %order.order_number, "order marked failed");
        Ok(order)
    }
}

/// Subtotal from the event's zone map, then 5% fees and 8% tax, all rounded
/// to two decimals. Seat order matches the request so the breakdown lines up.
fn price_selection(
    seat_ids: &[String],
    zones: &HashMap<String, crate::models::PricingZone>,
) -> Result<PriceBreakdown> {
    let mut subtotal = 0.0;
    for seat_id in seat_ids {
        let section = SeatRef::section_of(seat_id)?;
        let zone = zones.get(&section).ok_or_else(|| {
            Error::InvalidInput(format!("no pricing zone for section {}", section))
        })?;
        subtotal += zone.price;
    }
    let subtotal = round2(subtotal);
    let fees = round2(subtotal * FEE_RATE);
    let tax = round2(subtotal * TAX_RATE);
    Ok(PriceBreakdown {
        subtotal,
        fees,
        tax,
        total: round2(subtotal + fees + tax),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricingZone;

    fn zones() -> HashMap<String, PricingZone> {
        let mut zones = HashMap::new();
        zones.insert(
            "A".to_string(),
            PricingZone {
                name: "Zone A".to_string(),
                price: 10.0,
                currency: "USD".to_string(),
            },
        );
        zones.insert(
            "ORC".to_string(),
            PricingZone {
                name: "Orchestra".to_string(),
                price: 33.33,
                currency: "USD".to_string(),
            },
        );
        zones
    }

    #[test]
    fn prices_a_single_zone_selection() {
        let b = price_selection(&["A-R1-S1".to_string()], &zones()).unwrap();
        assert_eq!(b.subtotal, 10.0);
        assert_eq!(b.fees, 0.5);
        assert_eq!(b.tax, 0.8);
        assert_eq!(b.total, 11.3);
    }

    #[test]
    fn rounds_fees_and_tax_to_cents() {
        let seats = vec!["ORC-R1-S1".to_string(), "ORC-R1-S2".to_string()];
        let b = price_selection(&seats, &zones()).unwrap();
        assert_eq!(b.subtotal, 66.66);
        // 5% = 3.333 -> 3.33, 8% = 5.3328 -> 5.33
        assert_eq!(b.fees, 3.33);
        assert_eq!(b.tax, 5.33);
        assert_eq!(b.total, 75.32);
    }

    #[test]
    fn prefixed_seat_ids_price_through_their_section() {
        let b = price_selection(&["SEC-A-R2-S7".to_string()], &zones()).unwrap();
        assert_eq!(b.subtotal, 10.0);
    }

    #[test]
    fn unknown_section_is_invalid_input() {
        let err = price_selection(&["VIP-R1-S1".to_string()], &zones()).unwrap_err();
        assert_eq!(err.kind(), "INVALID_INPUT");
    }
}
