//! HTTP server: router plus health endpoints.

pub mod health;
pub mod routes;

pub use health::health_check;
pub use routes::{build_router, cors_layer};
