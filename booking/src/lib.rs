//! # Courtside booking engine
//!
//! Availability, admission and payment reconciliation for a studio that sells
//! fixed-capacity class slots (one court, one daily timeslot, one date).
//!
//! ## Architecture
//!
//! - **Catalog** ([`catalog`]): courts and timeslots, with soft deletion
//! - **Availability** ([`availability`]): read-only occupancy views
//! - **Admission** ([`admission`]): the capacity check and reservation insert, serialized per slot
//! - **Aggregates** ([`aggregates`]): reservation and payment state machines as reducers
//! - **Reconciliation** ([`reconciliation`]): applies gateway notifications to payment and reservation together
//! - **Store** ([`store`]): `PostgreSQL` and in-memory backends behind one transactional trait
//! - **Gateway** ([`payment_gateway`]): Midtrans Snap or a local dummy, behind a timeout and circuit breaker
//! - **App** ([`app`]): the service facade the HTTP layer and tests drive
//! - **API / Server** ([`api`], [`server`]): thin axum surface

pub mod admission;
pub mod aggregates;
pub mod api;
pub mod app;
pub mod availability;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod payment_gateway;
pub mod reconciliation;
pub mod server;
pub mod store;
pub mod types;

pub use app::BookingApp;
pub use config::Config;
pub use error::{BookingError, BookingResult, GatewayError, StoreError};
pub use types::*;
