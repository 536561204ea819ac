//! # HTTP Server Module
//!
//! Axum surface of the switch service.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/scheduler/run` - Bearer-authenticated sweep trigger
//! - `/verify/:token` - Verification page data and vote submission
//! - `/verifiers/accept/:token` - Verifier invitation acceptance

pub mod config;
mod errors;
mod health_routes;
mod scheduler_routes;
pub mod server;
mod state;
mod verify_routes;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ErrorBody};
pub use server::HttpServer;
pub use state::{ApiState, CycleHook};
pub use verify_routes::{AcceptedVerifier, VoteBody};
