//! # Final Message Delivery
//!
//! Decrypts released messages and hands them to the notifier, with the
//! `EmailDelivery` ledger guaranteeing at most one successful send per
//! message across repeated or overlapping runs.

mod errors;
mod ledger;

pub use errors::{DeliveryError, DeliveryResult};
pub use ledger::{DeliveryOutcome, DeliveryReport, MessageDelivery};
