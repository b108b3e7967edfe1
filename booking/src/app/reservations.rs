//! Reservation lifecycle operations.

use courtside_core::environment::Clock;
use courtside_core::reducer::Reducer;
use serde::Serialize;

use super::BookingApp;
use crate::aggregates::{ReservationAction, ReservationReducer, ReservationState};
use crate::error::{BookingError, BookingResult};
use crate::metrics;
use crate::store::{BookingStore, BookingTx};
use crate::types::{Court, Payment, Reservation, ReservationId, ReservationStatus, Timeslot, UserIdentity};

/// A reservation with the catalog entries and payment it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationDetails {
    /// The reservation
    #[serde(flatten)]
    pub reservation: Reservation,
    /// Court, if it still exists
    pub court: Option<Court>,
    /// Timeslot, if it still exists
    pub timeslot: Option<Timeslot>,
    /// Payment, once initiated
    pub payment: Option<Payment>,
}

impl<S: BookingStore> BookingApp<S> {
    pub(super) async fn owned_reservation(&self, identity: &UserIdentity, id: ReservationId) -> BookingResult<Reservation> {
        let reservation = self
            .store()
            .reservation(id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", id))?;
        if reservation.user_id != identity.user_id {
            return Err(BookingError::Unauthorized);
        }
        Ok(reservation)
    }

    /// Run one reservation action under the slot and row locks and persist the outcome.
    async fn transition_reservation(&self, id: ReservationId, action: ReservationAction) -> BookingResult<Reservation> {
        let current = self
            .store()
            .reservation(id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", id))?;

        let mut tx = self.store().begin().await?;
        tx.lock_slot(&current.slot()).await?;
        let locked = tx
            .reservation_for_update(id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", id))?;

        let mut state = ReservationState::loaded(locked.clone());
        let _ = ReservationReducer.reduce(&mut state, action, &self.reservation_env);
        if let Some(err) = state.last_error {
            return Err(err);
        }
        let updated = state.reservation.unwrap_or_else(|| locked.clone());
        if updated == locked {
            return Ok(locked);
        }

        tx.update_reservation(&updated).await?;
        tx.commit().await?;
        tracing::info!(
            target: "booking::audit",
            reservation_id = %updated.id,
            from = %locked.status,
            to = %updated.status,
            "Reservation transition"
        );
        Ok(updated)
    }

    /// Cancel the caller's own reservation.
    ///
    /// The payment, if any, is left as it is.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `NotCancellable`, `PastReservation` or store failures.
    pub async fn cancel(&self, identity: &UserIdentity, id: ReservationId) -> BookingResult<Reservation> {
        let reservation = self
            .transition_reservation(
                id,
                ReservationAction::Cancel {
                    reservation_id: id,
                    requested_by: identity.user_id,
                },
            )
            .await?;
        metrics::record_cancellation("user");
        Ok(reservation)
    }

    /// Mark a confirmed reservation as completed (scheduler hook).
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidInput` for a non-confirmed reservation, or store failures.
    pub async fn complete(&self, id: ReservationId) -> BookingResult<Reservation> {
        self.transition_reservation(id, ReservationAction::Complete { reservation_id: id }).await
    }

    /// The caller's reservation with court, timeslot and payment.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized` or store failures.
    pub async fn get_reservation(&self, identity: &UserIdentity, id: ReservationId) -> BookingResult<ReservationDetails> {
        let reservation = self.owned_reservation(identity, id).await?;
        let court = self.store().court(reservation.court_id).await?;
        let timeslot = self.store().timeslot(reservation.timeslot_id).await?;
        let payment = self
            .store()
            .payment_for_reservation(reservation.id)
            .await?
            .map(|p| self.observed(p));
        Ok(ReservationDetails {
            reservation,
            court,
            timeslot,
            payment,
        })
    }

    /// All of the caller's reservations, newest date first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_reservations(&self, identity: &UserIdentity) -> BookingResult<Vec<Reservation>> {
        Ok(self.store().reservations_for_user(identity.user_id).await?)
    }

    /// The caller's non-cancelled reservations from today on, soonest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn upcoming_reservations(&self, identity: &UserIdentity) -> BookingResult<Vec<Reservation>> {
        let today = self.clock().today();
        let mut upcoming: Vec<_> = self
            .list_reservations(identity)
            .await?
            .into_iter()
            .filter(|r| r.date >= today && r.status != ReservationStatus::Cancelled)
            .collect();
        upcoming.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        Ok(upcoming)
    }

    /// The caller's reservations before today, most recent first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn past_reservations(&self, identity: &UserIdentity) -> BookingResult<Vec<Reservation>> {
        let today = self.clock().today();
        let mut past: Vec<_> = self
            .list_reservations(identity)
            .await?
            .into_iter()
            .filter(|r| r.date < today)
            .collect();
        past.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(past)
    }
}
