//! Reservation aggregate.
//!
//! ```text
//! pending ──Confirm──▶ confirmed ──Complete──▶ completed
//!    │                     │
//!    └──Cancel / CancelByPaymentFailure──▶ cancelled
//! ```
//!
//! `cancelled` and `completed` are terminal. Rejected actions leave the
//! reservation untouched and record the reason in
//! [`ReservationState::last_error`].

use chrono::{DateTime, Utc};
use courtside_core::{effect::Effect, environment::Clock, reducer::Reducer, SmallVec};
use std::sync::Arc;

use crate::error::BookingError;
use crate::types::{Reservation, ReservationId, ReservationStatus, UserId};

// ============================================================================
// Actions
// ============================================================================

/// Inputs to the reservation state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReservationAction {
    /// Record a freshly admitted reservation
    Admit {
        /// The new reservation, in `pending`
        reservation: Reservation,
    },

    /// Owner cancels
    Cancel {
        /// Reservation to cancel
        reservation_id: ReservationId,
        /// Caller
        requested_by: UserId,
    },

    /// Payment settled
    Confirm {
        /// Reservation to confirm
        reservation_id: ReservationId,
    },

    /// Payment denied, expired or cancelled at the gateway
    CancelByPaymentFailure {
        /// Reservation to cancel
        reservation_id: ReservationId,
    },

    /// Session took place
    Complete {
        /// Reservation to complete
        reservation_id: ReservationId,
    },
}

// ============================================================================
// State & Environment
// ============================================================================

/// One reservation as loaded by the service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationState {
    /// The reservation, once admitted or loaded
    pub reservation: Option<Reservation>,
    /// Why the last action was rejected
    pub last_error: Option<BookingError>,
}

impl ReservationState {
    /// State for an already persisted reservation
    #[must_use]
    pub const fn loaded(reservation: Reservation) -> Self {
        Self {
            reservation: Some(reservation),
            last_error: None,
        }
    }

    /// Current status, if a reservation is loaded
    #[must_use]
    pub fn status(&self) -> Option<ReservationStatus> {
        self.reservation.as_ref().map(|r| r.status)
    }
}

/// Environment dependencies for the reservation aggregate
#[derive(Clone)]
pub struct ReservationEnvironment {
    /// Clock for timestamps and the "before today" rule
    pub clock: Arc<dyn Clock>,
}

impl ReservationEnvironment {
    /// Creates a new `ReservationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the reservation aggregate
#[derive(Clone, Copy, Debug, Default)]
pub struct ReservationReducer;

impl ReservationReducer {
    /// Creates a new `ReservationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn transition(reservation: &mut Reservation, to: ReservationStatus, now: DateTime<Utc>) {
        tracing::debug!(
            reservation_id = %reservation.id,
            from = %reservation.status,
            to = %to,
            "Reservation transition"
        );
        reservation.status = to;
        reservation.updated_at = now;
    }

    fn target(state: &mut ReservationState, id: ReservationId) -> Option<&mut Reservation> {
        match state.reservation.as_mut() {
            Some(reservation) if reservation.id == id => Some(reservation),
            _ => {
                state.last_error = Some(BookingError::not_found("reservation", id));
                None
            },
        }
    }
}

impl Reducer for ReservationReducer {
    type State = ReservationState;
    type Action = ReservationAction;
    type Environment = ReservationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        state.last_error = None;
        let now = env.clock.now();

        match action {
            ReservationAction::Admit { reservation } => {
                if state.reservation.is_some() {
                    state.last_error = Some(BookingError::InvalidInput(format!(
                        "reservation {} already loaded",
                        reservation.id
                    )));
                } else if reservation.status != ReservationStatus::Pending {
                    state.last_error = Some(BookingError::InvalidInput(
                        "new reservations start pending".to_string(),
                    ));
                } else {
                    state.reservation = Some(reservation);
                }
            },

            ReservationAction::Cancel {
                reservation_id,
                requested_by,
            } => {
                let today = env.clock.today();
                let Some(reservation) = Self::target(state, reservation_id) else {
                    return SmallVec::new();
                };
                let rejection = if reservation.user_id != requested_by {
                    Some(BookingError::Unauthorized)
                } else if reservation.status.is_terminal() {
                    Some(BookingError::NotCancellable(reservation.status))
                } else if reservation.date < today {
                    Some(BookingError::PastReservation)
                } else {
                    Self::transition(reservation, ReservationStatus::Cancelled, now);
                    None
                };
                state.last_error = rejection;
            },

            ReservationAction::Confirm { reservation_id } => {
                let Some(reservation) = Self::target(state, reservation_id) else {
                    return SmallVec::new();
                };
                match reservation.status {
                    ReservationStatus::Pending => {
                        Self::transition(reservation, ReservationStatus::Confirmed, now);
                    },
                    ReservationStatus::Confirmed => {},
                    status @ (ReservationStatus::Cancelled | ReservationStatus::Completed) => {
                        tracing::warn!(
                            reservation_id = %reservation.id,
                            status = %status,
                            "Settled payment for a reservation that can no longer be confirmed"
                        );
                    },
                }
            },

            ReservationAction::CancelByPaymentFailure { reservation_id } => {
                let Some(reservation) = Self::target(state, reservation_id) else {
                    return SmallVec::new();
                };
                if !reservation.status.is_terminal() {
                    Self::transition(reservation, ReservationStatus::Cancelled, now);
                }
            },

            ReservationAction::Complete { reservation_id } => {
                let Some(reservation) = Self::target(state, reservation_id) else {
                    return SmallVec::new();
                };
                match reservation.status {
                    ReservationStatus::Confirmed => {
                        Self::transition(reservation, ReservationStatus::Completed, now);
                    },
                    ReservationStatus::Completed => {},
                    status => {
                        state.last_error = Some(BookingError::InvalidInput(format!(
                            "only confirmed reservations can be completed (status '{status}')"
                        )));
                    },
                }
            },
        }

        SmallVec::new()
    }
}
