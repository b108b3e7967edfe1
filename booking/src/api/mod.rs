//! HTTP handlers.
//!
//! Handlers are thin: extract, call [`BookingApp`](crate::BookingApp), map
//! the error. Routes are assembled in [`server::routes`](crate::server::routes).

pub mod admin;
pub mod catalog;
pub mod error;
pub mod extractors;
pub mod payments;
pub mod reservations;

pub use error::ApiError;
pub use extractors::{Admin, Identity};
