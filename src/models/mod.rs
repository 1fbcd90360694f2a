pub mod event;
pub mod hold;
pub mod order;
pub mod seat;

pub use event::{Event, EventStatus, PricingZone, SeatPosition, VenueSection};
pub use hold::SeatHold;
pub use order::{CustomerInfo, Order, PaymentStatus, PriceBreakdown, Ticket};
pub use seat::{SeatRef, SeatState, SeatStatus};
