//! deadswitch - a dead man's switch service
//!
//! An owner keeps a recurring check-in. When it lapses the switch escalates
//! through timed stages, optionally waits for a quorum of verifiers, and
//! then releases per-recipient encrypted messages exactly once.

pub mod app;
pub mod audit;
pub mod cli;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod http_server;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod switch;
pub mod verification;

pub use app::{AppError, AppResult, DeadSwitch};
