pub mod bookings;
pub mod dev;
pub mod events;
pub mod health;
pub mod payments;
pub mod webhook;
