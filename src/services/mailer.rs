//! Confirmation-mail dispatch seam.
//!
//! Email transport lives outside this subsystem; the coordinator only needs
//! a best-effort fire-and-forget hook. Failures are logged by the caller and
//! never propagate into the checkout path.

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::models::Order;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()>;
}

/// Default implementation: log the dispatch and hand off nothing.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        info!(
            order_number = %order.order_number,
            email = %order.customer.email,
            tickets = order.tickets.len(),
            "order confirmation dispatched"
        );
        Ok(())
    }
}
