pub mod expiration;
pub mod mailer;
pub mod orders;
pub mod payment;
pub mod seats;
