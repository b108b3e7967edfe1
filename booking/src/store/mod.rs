//! Persistence seam.
//!
//! [`BookingStore`] covers plain reads and catalog writes. Anything that must
//! hold a capacity or state-machine invariant goes through a [`BookingTx`]:
//! the transaction serializes on a slot with [`BookingTx::lock_slot`], locks
//! rows with the `*_for_update` reads, and becomes visible only on
//! [`BookingTx::commit`]. Dropping a transaction without committing rolls it
//! back.
//!
//! Lock order is always slot, then reservation, then payment.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::types::{
    Court, CourtId, Payment, PaymentId, Reservation, ReservationId, SlotKey, Timeslot, TimeslotId, UserId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryBookingStore;
pub use postgres::PostgresBookingStore;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage backend for catalog, reservations and payments.
#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    /// Transaction handle
    type Tx: BookingTx;

    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Liveness probe.
    async fn ping(&self) -> StoreResult<()>;

    // ---- catalog -----------------------------------------------------------

    /// Courts ordered by name; `active_only` filters deactivated ones.
    async fn list_courts(&self, active_only: bool) -> StoreResult<Vec<Court>>;

    /// Court by id, active or not.
    async fn court(&self, id: CourtId) -> StoreResult<Option<Court>>;

    /// Insert a new court.
    async fn insert_court(&self, court: &Court) -> StoreResult<()>;

    /// Overwrite an existing court.
    async fn update_court(&self, court: &Court) -> StoreResult<()>;

    /// Timeslots ordered by `time` ascending; `active_only` filters deactivated ones.
    async fn list_timeslots(&self, active_only: bool) -> StoreResult<Vec<Timeslot>>;

    /// Timeslot by id, active or not.
    async fn timeslot(&self, id: TimeslotId) -> StoreResult<Option<Timeslot>>;

    /// Insert a new timeslot.
    async fn insert_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()>;

    /// Overwrite an existing timeslot.
    async fn update_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()>;

    // ---- reservation reads -------------------------------------------------

    /// Reservation by id.
    async fn reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>>;

    /// A user's reservations, newest date first, then newest creation first.
    async fn reservations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Reservation>>;

    /// Non-cancelled reservations for `timeslot_id` on `date`, across all courts.
    async fn count_booked(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<u64>;

    /// Courts holding at least one non-cancelled reservation for `timeslot_id` on `date`.
    async fn booked_court_ids(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<Vec<CourtId>>;

    /// Confirmed reservations on `slot`.
    async fn count_confirmed(&self, slot: &SlotKey) -> StoreResult<u64>;

    // ---- payment reads -----------------------------------------------------

    /// Payment by id.
    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>>;

    /// The payment attached to a reservation, if any.
    async fn payment_for_reservation(&self, reservation_id: ReservationId) -> StoreResult<Option<Payment>>;

    /// Payment by gateway transaction id.
    async fn payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>>;
}

/// Open store transaction.
#[async_trait]
pub trait BookingTx: Send {
    /// Serialize with every other transaction touching `slot`, until commit or rollback.
    async fn lock_slot(&mut self, slot: &SlotKey) -> StoreResult<()>;

    /// Confirmed reservations on `slot`, as seen by this transaction.
    async fn count_confirmed(&mut self, slot: &SlotKey) -> StoreResult<u64>;

    /// Court by id, as seen by this transaction.
    async fn court(&mut self, id: CourtId) -> StoreResult<Option<Court>>;

    /// Timeslot by id, as seen by this transaction.
    async fn timeslot(&mut self, id: TimeslotId) -> StoreResult<Option<Timeslot>>;

    /// Insert a new reservation.
    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;

    /// Read and lock a reservation.
    async fn reservation_for_update(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>>;

    /// Persist a reservation's status, notes and `updated_at`.
    async fn update_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;

    /// Read and lock the payment attached to a reservation.
    async fn payment_for_reservation_for_update(&mut self, reservation_id: ReservationId) -> StoreResult<Option<Payment>>;

    /// Read and lock a payment.
    async fn payment_for_update(&mut self, id: PaymentId) -> StoreResult<Option<Payment>>;

    /// Insert a new payment.
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    /// Persist every mutable payment field.
    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    /// Make all writes visible and release locks.
    async fn commit(self) -> StoreResult<()>;
}
