pub mod catalog;
pub mod conflict;
pub mod gateway;
pub mod lifecycle;
pub mod reconciliation;
