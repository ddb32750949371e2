//! Concurrent race-condition and idempotency testing for payment endpoints.

pub mod config;
pub mod errors;
pub mod heuristics;
pub mod http;
pub mod idempotency;
pub mod models;
pub mod race;
pub mod scan;
pub mod utils;
pub mod websocket;
