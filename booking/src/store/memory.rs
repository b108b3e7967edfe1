//! Process-local store.
//!
//! All tables sit behind one `tokio` mutex. A transaction owns the guard for
//! its whole lifetime, which makes transactions fully serial; writes go
//! straight to the tables and an undo log restores them if the transaction
//! is dropped without commit.
//!
//! A task holding a transaction must not call the non-transactional
//! [`BookingStore`] methods on the same store: they wait for the same mutex.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookingStore, BookingTx, StoreResult};
use crate::error::StoreError;
use crate::types::{
    Court, CourtId, Payment, PaymentId, Reservation, ReservationId, ReservationStatus, SlotKey, Timeslot, TimeslotId,
    UserId,
};

#[derive(Debug, Default)]
struct Tables {
    courts: HashMap<CourtId, Court>,
    timeslots: HashMap<TimeslotId, Timeslot>,
    reservations: HashMap<ReservationId, Reservation>,
    payments: HashMap<PaymentId, Payment>,
}

impl Tables {
    fn count_confirmed(&self, slot: &SlotKey) -> u64 {
        self.reservations
            .values()
            .filter(|r| r.slot() == *slot && r.status == ReservationStatus::Confirmed)
            .count() as u64
    }

    fn payment_for_reservation(&self, reservation_id: ReservationId) -> Option<Payment> {
        self.payments.values().find(|p| p.reservation_id == reservation_id).cloned()
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_next_write: AtomicBool,
    fail_next_commit: AtomicBool,
}

impl Faults {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn take(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected {what} failure")));
        }
        Ok(())
    }
}

/// In-memory [`BookingStore`] with failure injection for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next transactional write.
    pub fn fail_next_write(&self) {
        self.faults.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Fail the next commit; the transaction is rolled back.
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    async fn read(&self) -> StoreResult<OwnedMutexGuard<Tables>> {
        self.faults.check_available()?;
        Ok(Arc::clone(&self.tables).lock_owned().await)
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let guard = self.read().await?;
        Ok(InMemoryTx {
            tables: guard,
            undo: Vec::new(),
            faults: Arc::clone(&self.faults),
            committed: false,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.faults.check_available()
    }

    async fn list_courts(&self, active_only: bool) -> StoreResult<Vec<Court>> {
        let tables = self.read().await?;
        let mut courts: Vec<Court> = tables.courts.values().filter(|c| c.active || !active_only).cloned().collect();
        courts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(courts)
    }

    async fn court(&self, id: CourtId) -> StoreResult<Option<Court>> {
        Ok(self.read().await?.courts.get(&id).cloned())
    }

    async fn insert_court(&self, court: &Court) -> StoreResult<()> {
        let mut tables = self.read().await?;
        if tables.courts.contains_key(&court.id) {
            return Err(StoreError::Conflict(format!("court {} exists", court.id)));
        }
        tables.courts.insert(court.id, court.clone());
        Ok(())
    }

    async fn update_court(&self, court: &Court) -> StoreResult<()> {
        self.read().await?.courts.insert(court.id, court.clone());
        Ok(())
    }

    async fn list_timeslots(&self, active_only: bool) -> StoreResult<Vec<Timeslot>> {
        let tables = self.read().await?;
        let mut slots: Vec<Timeslot> =
            tables.timeslots.values().filter(|t| t.active || !active_only).cloned().collect();
        slots.sort_by(|a, b| a.time.cmp(&b.time));
        Ok(slots)
    }

    async fn timeslot(&self, id: TimeslotId) -> StoreResult<Option<Timeslot>> {
        Ok(self.read().await?.timeslots.get(&id).cloned())
    }

    async fn insert_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()> {
        let mut tables = self.read().await?;
        if tables.timeslots.contains_key(&timeslot.id) {
            return Err(StoreError::Conflict(format!("timeslot {} exists", timeslot.id)));
        }
        tables.timeslots.insert(timeslot.id, timeslot.clone());
        Ok(())
    }

    async fn update_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()> {
        self.read().await?.timeslots.insert(timeslot.id, timeslot.clone());
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        Ok(self.read().await?.reservations.get(&id).cloned())
    }

    async fn reservations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Reservation>> {
        let tables = self.read().await?;
        let mut list: Vec<Reservation> =
            tables.reservations.values().filter(|r| r.user_id == user_id).cloned().collect();
        list.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(list)
    }

    async fn count_booked(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<u64> {
        let tables = self.read().await?;
        Ok(tables
            .reservations
            .values()
            .filter(|r| r.date == date && r.timeslot_id == timeslot_id && r.status != ReservationStatus::Cancelled)
            .count() as u64)
    }

    async fn booked_court_ids(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<Vec<CourtId>> {
        let tables = self.read().await?;
        let mut ids: Vec<CourtId> = tables
            .reservations
            .values()
            .filter(|r| r.date == date && r.timeslot_id == timeslot_id && r.status != ReservationStatus::Cancelled)
            .map(|r| r.court_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn count_confirmed(&self, slot: &SlotKey) -> StoreResult<u64> {
        Ok(self.read().await?.count_confirmed(slot))
    }

    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
        Ok(self.read().await?.payments.get(&id).cloned())
    }

    async fn payment_for_reservation(&self, reservation_id: ReservationId) -> StoreResult<Option<Payment>> {
        Ok(self.read().await?.payment_for_reservation(reservation_id))
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        let tables = self.read().await?;
        Ok(tables.payments.values().find(|p| p.transaction_id == transaction_id).cloned())
    }
}

#[derive(Debug)]
enum Undo {
    ReservationInserted(ReservationId),
    ReservationUpdated(Box<Reservation>),
    PaymentInserted(PaymentId),
    PaymentUpdated(Box<Payment>),
}

/// Transaction over [`InMemoryBookingStore`]; holds the table lock until dropped.
#[derive(Debug)]
pub struct InMemoryTx {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    faults: Arc<Faults>,
    committed: bool,
}

impl InMemoryTx {
    fn before_write(&self) -> StoreResult<()> {
        self.faults.check_available()?;
        Faults::take(&self.faults.fail_next_write, "write")
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        tracing::debug!(writes = self.undo.len(), "Rolling back in-memory transaction");
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::ReservationInserted(id) => {
                    self.tables.reservations.remove(&id);
                },
                Undo::ReservationUpdated(previous) => {
                    self.tables.reservations.insert(previous.id, *previous);
                },
                Undo::PaymentInserted(id) => {
                    self.tables.payments.remove(&id);
                },
                Undo::PaymentUpdated(previous) => {
                    self.tables.payments.insert(previous.id, *previous);
                },
            }
        }
    }
}

#[async_trait]
impl BookingTx for InMemoryTx {
    async fn lock_slot(&mut self, _slot: &SlotKey) -> StoreResult<()> {
        // The table guard already serializes every transaction.
        self.faults.check_available()
    }

    async fn count_confirmed(&mut self, slot: &SlotKey) -> StoreResult<u64> {
        self.faults.check_available()?;
        Ok(self.tables.count_confirmed(slot))
    }

    async fn court(&mut self, id: CourtId) -> StoreResult<Option<Court>> {
        self.faults.check_available()?;
        Ok(self.tables.courts.get(&id).cloned())
    }

    async fn timeslot(&mut self, id: TimeslotId) -> StoreResult<Option<Timeslot>> {
        self.faults.check_available()?;
        Ok(self.tables.timeslots.get(&id).cloned())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        self.before_write()?;
        if self.tables.reservations.contains_key(&reservation.id) {
            return Err(StoreError::Conflict(format!("reservation {} exists", reservation.id)));
        }
        self.tables.reservations.insert(reservation.id, reservation.clone());
        self.undo.push(Undo::ReservationInserted(reservation.id));
        Ok(())
    }

    async fn reservation_for_update(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        self.faults.check_available()?;
        Ok(self.tables.reservations.get(&id).cloned())
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        self.before_write()?;
        let previous = self
            .tables
            .reservations
            .insert(reservation.id, reservation.clone())
            .ok_or_else(|| StoreError::Corrupt(format!("reservation {} vanished", reservation.id)))?;
        self.undo.push(Undo::ReservationUpdated(Box::new(previous)));
        Ok(())
    }

    async fn payment_for_reservation_for_update(&mut self, reservation_id: ReservationId) -> StoreResult<Option<Payment>> {
        self.faults.check_available()?;
        Ok(self.tables.payment_for_reservation(reservation_id))
    }

    async fn payment_for_update(&mut self, id: PaymentId) -> StoreResult<Option<Payment>> {
        self.faults.check_available()?;
        Ok(self.tables.payments.get(&id).cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.before_write()?;
        let clash = self
            .tables
            .payments
            .values()
            .any(|p| p.id == payment.id || p.reservation_id == payment.reservation_id || p.transaction_id == payment.transaction_id);
        if clash {
            return Err(StoreError::Conflict(format!(
                "payment for reservation {} or transaction {} exists",
                payment.reservation_id, payment.transaction_id
            )));
        }
        self.tables.payments.insert(payment.id, payment.clone());
        self.undo.push(Undo::PaymentInserted(payment.id));
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.before_write()?;
        let previous = self
            .tables
            .payments
            .insert(payment.id, payment.clone())
            .ok_or_else(|| StoreError::Corrupt(format!("payment {} vanished", payment.id)))?;
        self.undo.push(Undo::PaymentUpdated(Box::new(previous)));
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.faults.check_available()?;
        Faults::take(&self.faults.fail_next_commit, "commit")?;
        self.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::types::Money;
    use chrono::Utc;

    fn reservation(slot: SlotKey, status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: ReservationId::new(),
            user_id: UserId::new(),
            court_id: slot.court_id,
            timeslot_id: slot.timeslot_id,
            date: slot.date,
            status,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn slot() -> SlotKey {
        SlotKey {
            court_id: CourtId::new(),
            timeslot_id: TimeslotId::new(),
            date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryBookingStore::new();
        let r = reservation(slot(), ReservationStatus::Pending);
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_reservation(&r).await.unwrap();
        }
        assert!(store.reservation(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_updates() {
        let store = InMemoryBookingStore::new();
        let mut r = reservation(slot(), ReservationStatus::Pending);
        let mut tx = store.begin().await.unwrap();
        tx.insert_reservation(&r).await.unwrap();
        tx.commit().await.unwrap();

        store.fail_next_commit();
        let mut tx = store.begin().await.unwrap();
        r.status = ReservationStatus::Confirmed;
        tx.update_reservation(&r).await.unwrap();
        assert!(tx.commit().await.is_err());

        let stored = store.reservation(r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn confirmed_count_ignores_other_statuses() {
        let store = InMemoryBookingStore::new();
        let key = slot();
        let mut tx = store.begin().await.unwrap();
        for status in [ReservationStatus::Confirmed, ReservationStatus::Pending, ReservationStatus::Cancelled] {
            tx.insert_reservation(&reservation(key, status)).await.unwrap();
        }
        assert_eq!(tx.count_confirmed(&key).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.count_booked(key.date, key.timeslot_id).await.unwrap(), 2);
        assert_eq!(store.booked_court_ids(key.date, key.timeslot_id).await.unwrap(), vec![key.court_id]);
    }

    #[tokio::test]
    async fn one_payment_per_reservation() {
        let store = InMemoryBookingStore::new();
        let now = Utc::now();
        let reservation_id = ReservationId::new();
        let payment = |tx_id: &str| Payment {
            id: PaymentId::new(),
            reservation_id,
            amount: Money::default_session_price(),
            status: crate::types::PaymentStatus::Pending,
            payment_method: None,
            transaction_id: tx_id.to_string(),
            gateway_token: None,
            redirect_url: None,
            paid_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_payment(&payment("TRX-a")).await.unwrap();
        let err = tx.insert_payment(&payment("TRX-b")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn unavailable_store_refuses_reads() {
        let store = InMemoryBookingStore::new();
        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        assert!(store.list_courts(true).await.is_err());
        store.set_unavailable(false);
        assert!(store.list_courts(true).await.unwrap().is_empty());
    }
}
