//! Reservation and payment state machines.
//!
//! Each aggregate is a [`Reducer`](courtside_core::reducer::Reducer) over a
//! single loaded row. Services load the row inside a store transaction,
//! reduce, and persist the row only if the reducer changed it.

pub mod payment;
pub mod reservation;

pub use payment::{PaymentAction, PaymentEnvironment, PaymentReducer, PaymentState};
pub use reservation::{ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState};
