//! Reservation admission.
//!
//! The capacity check and the insert happen in one store transaction that
//! holds the slot lock, so two concurrent admissions for the last place on a
//! slot cannot both pass. Only confirmed reservations occupy a slot here;
//! pending ones are admitted freely.

use chrono::NaiveDate;
use courtside_core::environment::Clock;
use courtside_core::reducer::Reducer;

use crate::aggregates::{ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState};
use crate::error::{BookingError, BookingResult};
use crate::metrics;
use crate::store::{BookingStore, BookingTx};
use crate::types::{
    parse_date, Court, CourtId, Reservation, ReservationId, ReservationStatus, SlotKey, Timeslot, TimeslotId,
    UserIdentity,
};

/// What a caller asks to book
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// Court to book
    pub court_id: CourtId,
    /// Timeslot to book
    pub timeslot_id: TimeslotId,
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    /// Free text
    pub notes: Option<String>,
}

/// Admission verdict for a parsed request.
///
/// Checks run in a fixed order: date, court, timeslot, capacity. Returns the
/// slot to occupy when every check passes.
///
/// # Errors
///
/// `PastDate`, `NotFound`, `CourtInactive`, `TimeslotInactive` or `CapacityExceeded`.
pub fn decide(
    date: NaiveDate,
    today: NaiveDate,
    court_id: CourtId,
    court: Option<&Court>,
    timeslot_id: TimeslotId,
    timeslot: Option<&Timeslot>,
    occupying: u64,
) -> BookingResult<SlotKey> {
    if date < today {
        return Err(BookingError::PastDate(date));
    }

    let court = court.ok_or_else(|| BookingError::not_found("court", court_id))?;
    if !court.active {
        return Err(BookingError::CourtInactive(court.id));
    }

    let timeslot = timeslot.ok_or_else(|| BookingError::not_found("timeslot", timeslot_id))?;
    if !timeslot.active {
        return Err(BookingError::TimeslotInactive(timeslot.id));
    }

    let slot = SlotKey {
        court_id: court.id,
        timeslot_id: timeslot.id,
        date,
    };
    if occupying >= u64::from(court.capacity) {
        return Err(BookingError::CapacityExceeded {
            slot,
            capacity: court.capacity,
        });
    }
    Ok(slot)
}

/// Admit a new `pending` reservation for `identity`.
///
/// # Errors
///
/// `InvalidDate` plus everything [`decide`] rejects; `StoreUnavailable` when
/// the store fails, in which case nothing was written.
pub async fn admit<S: BookingStore>(
    store: &S,
    clock: &dyn Clock,
    reducer_env: &ReservationEnvironment,
    identity: &UserIdentity,
    request: AdmissionRequest,
) -> BookingResult<Reservation> {
    let result = try_admit(store, clock, reducer_env, identity, request).await;
    match &result {
        Ok(reservation) => {
            metrics::record_admission("admitted");
            tracing::info!(
                target: "booking::audit",
                reservation_id = %reservation.id,
                user_id = %reservation.user_id,
                slot = %reservation.slot(),
                "Reservation admitted"
            );
        },
        Err(err) => {
            metrics::record_admission(err.kind());
            if err.is_infrastructure() {
                tracing::error!(user_id = %identity.user_id, error = %err, "Admission failed");
            } else {
                tracing::debug!(user_id = %identity.user_id, error = %err, "Admission refused");
            }
        },
    }
    result
}

async fn try_admit<S: BookingStore>(
    store: &S,
    clock: &dyn Clock,
    reducer_env: &ReservationEnvironment,
    identity: &UserIdentity,
    request: AdmissionRequest,
) -> BookingResult<Reservation> {
    let date = parse_date(&request.date)?;
    let today = clock.today();
    if date < today {
        return Err(BookingError::PastDate(date));
    }

    let slot = SlotKey {
        court_id: request.court_id,
        timeslot_id: request.timeslot_id,
        date,
    };

    // Catalog rows are read under the slot lock so the decision sees the
    // capacity in force when it commits.
    let mut tx = store.begin().await?;
    tx.lock_slot(&slot).await?;
    let court = tx.court(request.court_id).await?;
    let timeslot = tx.timeslot(request.timeslot_id).await?;
    let occupying = tx.count_confirmed(&slot).await?;
    decide(
        date,
        today,
        request.court_id,
        court.as_ref(),
        request.timeslot_id,
        timeslot.as_ref(),
        occupying,
    )?;

    let now = clock.now();
    let candidate = Reservation {
        id: ReservationId::new(),
        user_id: identity.user_id,
        court_id: slot.court_id,
        timeslot_id: slot.timeslot_id,
        date,
        status: ReservationStatus::Pending,
        notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        created_at: now,
        updated_at: now,
    };

    let mut state = ReservationState::default();
    let _ = ReservationReducer.reduce(&mut state, ReservationAction::Admit { reservation: candidate }, reducer_env);
    if let Some(err) = state.last_error {
        return Err(err);
    }
    let reservation = state
        .reservation
        .ok_or_else(|| BookingError::InvalidInput("admission produced no reservation".to_string()))?;

    tx.insert_reservation(&reservation).await?;
    tx.commit().await?;
    Ok(reservation)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::catalog;
    use crate::store::memory::InMemoryTx;
    use crate::store::{InMemoryBookingStore, StoreResult};
    use crate::types::{Payment, PaymentId, UserId};
    use courtside_testing::{test_clock, FixedClock};
    use std::sync::Arc;

    struct Fixture {
        store: InMemoryBookingStore,
        clock: FixedClock,
        env: ReservationEnvironment,
        court: Court,
        timeslot: Timeslot,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();
        catalog::seed_defaults(&store, &clock).await.unwrap();
        let court = catalog::list_active_courts(&store).await.unwrap().remove(1);
        let timeslot = catalog::list_active_timeslots(&store).await.unwrap().remove(0);
        let env = ReservationEnvironment::new(Arc::new(clock.clone()));
        Fixture {
            store,
            clock,
            env,
            court,
            timeslot,
        }
    }

    fn request(f: &Fixture, date: &str) -> AdmissionRequest {
        AdmissionRequest {
            court_id: f.court.id,
            timeslot_id: f.timeslot.id,
            date: date.to_string(),
            notes: Some("  first class  ".to_string()),
        }
    }

    fn someone() -> UserIdentity {
        UserIdentity::new(UserId::new(), "member@example.com")
    }

    #[test]
    fn checks_run_in_order() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let past = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        let (court_id, timeslot_id) = (CourtId::new(), TimeslotId::new());

        assert_eq!(
            decide(past, today, court_id, None, timeslot_id, None, 0),
            Err(BookingError::PastDate(past))
        );
        assert!(matches!(
            decide(today, today, court_id, None, timeslot_id, None, 0),
            Err(BookingError::NotFound { entity: "court", .. })
        ));
    }

    #[tokio::test]
    async fn admits_pending_reservation_with_trimmed_notes() {
        let f = fixture().await;
        let who = someone();
        let reservation = admit(&f.store, &f.clock, &f.env, &who, request(&f, "2025-01-01")).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.user_id, who.user_id);
        assert_eq!(reservation.notes.as_deref(), Some("first class"));
        assert_eq!(f.store.reservation(reservation.id).await.unwrap(), Some(reservation));
    }

    #[tokio::test]
    async fn rejects_past_and_malformed_dates() {
        let f = fixture().await;
        assert!(matches!(
            admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2024-12-31")).await,
            Err(BookingError::PastDate(_))
        ));
        assert!(matches!(
            admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025/01/02")).await,
            Err(BookingError::InvalidDate(_))
        ));
    }

    #[tokio::test]
    async fn inactive_court_is_refused() {
        let f = fixture().await;
        catalog::delete_court(&f.store, &f.clock, f.court.id).await.unwrap();
        assert_eq!(
            admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025-01-02")).await,
            Err(BookingError::CourtInactive(f.court.id))
        );
    }

    #[tokio::test]
    async fn confirmed_reservations_fill_the_slot() {
        let f = fixture().await;
        for _ in 0..f.court.capacity {
            let r = admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025-01-02")).await.unwrap();
            let mut tx = f.store.begin().await.unwrap();
            let mut confirmed = r.clone();
            confirmed.status = ReservationStatus::Confirmed;
            tx.update_reservation(&confirmed).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025-01-02")).await.unwrap_err();
        assert!(matches!(err, BookingError::CapacityExceeded { capacity: 8, .. }));

        // Other dates are unaffected.
        assert!(admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025-01-03")).await.is_ok());
    }

    #[tokio::test]
    async fn pending_reservations_do_not_occupy() {
        let f = fixture().await;
        for _ in 0..=f.court.capacity {
            admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025-01-02")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let f = fixture().await;
        let who = someone();
        f.store.fail_next_write();

        let err = admit(&f.store, &f.clock, &f.env, &who, request(&f, "2025-01-02")).await.unwrap_err();
        assert!(matches!(err, BookingError::StoreUnavailable(_)));
        assert!(f.store.reservations_for_user(who.user_id).await.unwrap().is_empty());
    }

    /// Store whose plain reads return a stale court, like a lagging replica.
    struct LaggingStore {
        inner: InMemoryBookingStore,
        stale: Court,
    }

    #[async_trait::async_trait]
    impl BookingStore for LaggingStore {
        type Tx = InMemoryTx;

        async fn begin(&self) -> StoreResult<Self::Tx> {
            self.inner.begin().await
        }
        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }
        async fn list_courts(&self, active_only: bool) -> StoreResult<Vec<Court>> {
            self.inner.list_courts(active_only).await
        }
        async fn court(&self, id: CourtId) -> StoreResult<Option<Court>> {
            if id == self.stale.id {
                return Ok(Some(self.stale.clone()));
            }
            self.inner.court(id).await
        }
        async fn insert_court(&self, court: &Court) -> StoreResult<()> {
            self.inner.insert_court(court).await
        }
        async fn update_court(&self, court: &Court) -> StoreResult<()> {
            self.inner.update_court(court).await
        }
        async fn list_timeslots(&self, active_only: bool) -> StoreResult<Vec<Timeslot>> {
            self.inner.list_timeslots(active_only).await
        }
        async fn timeslot(&self, id: TimeslotId) -> StoreResult<Option<Timeslot>> {
            self.inner.timeslot(id).await
        }
        async fn insert_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()> {
            self.inner.insert_timeslot(timeslot).await
        }
        async fn update_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()> {
            self.inner.update_timeslot(timeslot).await
        }
        async fn reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
            self.inner.reservation(id).await
        }
        async fn reservations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Reservation>> {
            self.inner.reservations_for_user(user_id).await
        }
        async fn count_booked(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<u64> {
            self.inner.count_booked(date, timeslot_id).await
        }
        async fn booked_court_ids(
            &self,
            date: NaiveDate,
            timeslot_id: TimeslotId,
        ) -> StoreResult<Vec<CourtId>> {
            self.inner.booked_court_ids(date, timeslot_id).await
        }
        async fn count_confirmed(&self, slot: &SlotKey) -> StoreResult<u64> {
            self.inner.count_confirmed(slot).await
        }
        async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
            self.inner.payment(id).await
        }
        async fn payment_for_reservation(
            &self,
            reservation_id: ReservationId,
        ) -> StoreResult<Option<Payment>> {
            self.inner.payment_for_reservation(reservation_id).await
        }
        async fn payment_by_transaction(
            &self,
            transaction_id: &str,
        ) -> StoreResult<Option<Payment>> {
            self.inner.payment_by_transaction(transaction_id).await
        }
    }

    /// Capacity is taken from the court row read under the slot lock, not
    /// from an earlier read.
    #[tokio::test]
    async fn capacity_is_read_under_the_slot_lock() {
        let f = fixture().await;
        let first = admit(&f.store, &f.clock, &f.env, &someone(), request(&f, "2025-01-02")).await.unwrap();
        let mut tx = f.store.begin().await.unwrap();
        let mut confirmed = first.clone();
        confirmed.status = ReservationStatus::Confirmed;
        tx.update_reservation(&confirmed).await.unwrap();
        tx.commit().await.unwrap();

        let lowered = catalog::update_court(
            &f.store,
            &f.clock,
            f.court.id,
            catalog::CourtUpdate {
                capacity: 1,
                ..catalog::CourtUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(lowered.capacity, 1);

        let lagging = LaggingStore {
            inner: f.store.clone(),
            stale: f.court.clone(),
        };
        let err = admit(&lagging, &f.clock, &f.env, &someone(), request(&f, "2025-01-02")).await.unwrap_err();
        assert!(matches!(err, BookingError::CapacityExceeded { capacity: 1, .. }), "got {err:?}");
    }
}
