pub mod orders;
pub mod payments;
pub mod seats;

use axum::{routing::any, Router};

use crate::realtime::ws::websocket_handler;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(seats::routes())
        .merge(orders::routes())
        .merge(payments::routes())
        .route("/ws", any(websocket_handler))
}
