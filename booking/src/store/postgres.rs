//! `PostgreSQL` store.
//!
//! Slot serialization uses a transaction-scoped advisory lock keyed by the
//! slot's text key; row locks use `SELECT ... FOR UPDATE`. Uniqueness of
//! `payments.transaction_id` and `payments.reservation_id` is enforced by
//! unique indexes (see `migrations/`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;

use super::{BookingStore, BookingTx, StoreResult};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::types::{
    Court, CourtId, Money, Payment, PaymentId, Reservation, ReservationId, SlotKey, Timeslot, TimeslotId, UserId,
};
use courtside_runtime::retry::{retry_if, RetryPolicy};

const RESERVATION_COLUMNS: &str = "id, user_id, court_id, timeslot_id, date, status, notes, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, reservation_id, amount, currency, status, payment_method, transaction_id, \
                               gateway_token, redirect_url, paid_at, expires_at, created_at, updated_at";

#[derive(FromRow)]
struct CourtRow {
    id: uuid::Uuid,
    name: String,
    capacity: i32,
    description: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourtRow> for Court {
    type Error = StoreError;

    fn try_from(row: CourtRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CourtId::from_uuid(row.id),
            name: row.name,
            capacity: u32::try_from(row.capacity).map_err(|_| StoreError::Corrupt(format!("court {} capacity", row.id)))?,
            description: row.description,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TimeslotRow {
    id: uuid::Uuid,
    start_time: String,
    duration_minutes: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TimeslotRow> for Timeslot {
    type Error = StoreError;

    fn try_from(row: TimeslotRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TimeslotId::from_uuid(row.id),
            time: row.start_time,
            duration_minutes: u32::try_from(row.duration_minutes)
                .map_err(|_| StoreError::Corrupt(format!("timeslot {} duration", row.id)))?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ReservationRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    court_id: uuid::Uuid,
    timeslot_id: uuid::Uuid,
    date: NaiveDate,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ReservationId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            court_id: CourtId::from_uuid(row.court_id),
            timeslot_id: TimeslotId::from_uuid(row.timeslot_id),
            date: row.date,
            status: row.status.parse().map_err(|e| StoreError::Corrupt(format!("reservation {}: {e}", row.id)))?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    id: uuid::Uuid,
    reservation_id: uuid::Uuid,
    amount: i64,
    currency: String,
    status: String,
    payment_method: Option<String>,
    transaction_id: String,
    gateway_token: Option<String>,
    redirect_url: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let amount =
            u64::try_from(row.amount).map_err(|_| StoreError::Corrupt(format!("payment {} amount", row.id)))?;
        Ok(Self {
            id: PaymentId::from_uuid(row.id),
            reservation_id: ReservationId::from_uuid(row.reservation_id),
            amount: Money::new(amount, row.currency),
            status: row.status.parse().map_err(|e| StoreError::Corrupt(format!("payment {}: {e}", row.id)))?,
            payment_method: row.payment_method,
            transaction_id: row.transaction_id,
            gateway_token: row.gateway_token,
            redirect_url: row.redirect_url,
            paid_at: row.paid_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
        _ => StoreError::Database(err),
    }
}

fn to_i64(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} out of range")))
}

fn to_i32(value: u32, what: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} out of range")))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// [`BookingStore`] backed by a `PgPool`.
#[derive(Clone, Debug)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with retry on transient failures and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if no connection could be made or migrations fail.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let policy = RetryPolicy::builder()
            .max_retries(config.connect_retries)
            .initial_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(10))
            .build();

        let pool = retry_if(
            &policy,
            "postgres_connect",
            || async move {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(Duration::from_secs(config.connect_timeout))
                    .connect(&config.database_url)
                    .await
                    .map_err(StoreError::from)
            },
            StoreError::is_transient,
        )
        .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(store)
    }

    /// Apply embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migration`] when a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> StoreResult<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_courts(&self, active_only: bool) -> StoreResult<Vec<Court>> {
        let rows: Vec<CourtRow> = sqlx::query_as(
            "SELECT id, name, capacity, description, active, created_at, updated_at
             FROM courts
             WHERE active OR NOT $1
             ORDER BY name ASC",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Court::try_from).collect()
    }

    async fn court(&self, id: CourtId) -> StoreResult<Option<Court>> {
        let row: Option<CourtRow> = sqlx::query_as(
            "SELECT id, name, capacity, description, active, created_at, updated_at FROM courts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Court::try_from).transpose()
    }

    async fn insert_court(&self, court: &Court) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO courts (id, name, capacity, description, active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(court.id.as_uuid())
        .bind(&court.name)
        .bind(to_i32(court.capacity, "capacity")?)
        .bind(&court.description)
        .bind(court.active)
        .bind(court.created_at)
        .bind(court.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_court(&self, court: &Court) -> StoreResult<()> {
        sqlx::query(
            "UPDATE courts SET name = $2, capacity = $3, description = $4, active = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(court.id.as_uuid())
        .bind(&court.name)
        .bind(to_i32(court.capacity, "capacity")?)
        .bind(&court.description)
        .bind(court.active)
        .bind(court.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn list_timeslots(&self, active_only: bool) -> StoreResult<Vec<Timeslot>> {
        let rows: Vec<TimeslotRow> = sqlx::query_as(
            "SELECT id, start_time, duration_minutes, active, created_at, updated_at
             FROM timeslots
             WHERE active OR NOT $1
             ORDER BY start_time ASC",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Timeslot::try_from).collect()
    }

    async fn timeslot(&self, id: TimeslotId) -> StoreResult<Option<Timeslot>> {
        let row: Option<TimeslotRow> = sqlx::query_as(
            "SELECT id, start_time, duration_minutes, active, created_at, updated_at FROM timeslots WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Timeslot::try_from).transpose()
    }

    async fn insert_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO timeslots (id, start_time, duration_minutes, active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(timeslot.id.as_uuid())
        .bind(&timeslot.time)
        .bind(to_i32(timeslot.duration_minutes, "duration")?)
        .bind(timeslot.active)
        .bind(timeslot.created_at)
        .bind(timeslot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_timeslot(&self, timeslot: &Timeslot) -> StoreResult<()> {
        sqlx::query(
            "UPDATE timeslots SET start_time = $2, duration_minutes = $3, active = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(timeslot.id.as_uuid())
        .bind(&timeslot.time)
        .bind(to_i32(timeslot.duration_minutes, "duration")?)
        .bind(timeslot.active)
        .bind(timeslot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> =
            sqlx::query_as(&format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn reservations_for_user(&self, user_id: UserId) -> StoreResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE user_id = $1
             ORDER BY date DESC, created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn count_booked(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<u64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM reservations
             WHERE date = $1 AND timeslot_id = $2 AND status <> 'cancelled'",
        )
        .bind(date)
        .bind(timeslot_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(count(n))
    }

    async fn booked_court_ids(&self, date: NaiveDate, timeslot_id: TimeslotId) -> StoreResult<Vec<CourtId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT court_id FROM reservations
             WHERE date = $1 AND timeslot_id = $2 AND status <> 'cancelled'
             ORDER BY court_id",
        )
        .bind(date)
        .bind(timeslot_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| CourtId::from_uuid(id)).collect())
    }

    async fn count_confirmed(&self, slot: &SlotKey) -> StoreResult<u64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM reservations
             WHERE court_id = $1 AND timeslot_id = $2 AND date = $3 AND status = 'confirmed'",
        )
        .bind(slot.court_id.as_uuid())
        .bind(slot.timeslot_id.as_uuid())
        .bind(slot.date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count(n))
    }

    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn payment_for_reservation(&self, reservation_id: ReservationId) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE reservation_id = $1"))
                .bind(reservation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"))
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Payment::try_from).transpose()
    }
}

/// Transaction over [`PostgresBookingStore`]; rolled back by sqlx when dropped uncommitted.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTx for PostgresTx {
    async fn lock_slot(&mut self, slot: &SlotKey) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(slot.lock_key())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_confirmed(&mut self, slot: &SlotKey) -> StoreResult<u64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM reservations
             WHERE court_id = $1 AND timeslot_id = $2 AND date = $3 AND status = 'confirmed'",
        )
        .bind(slot.court_id.as_uuid())
        .bind(slot.timeslot_id.as_uuid())
        .bind(slot.date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count(n))
    }

    async fn court(&mut self, id: CourtId) -> StoreResult<Option<Court>> {
        let row: Option<CourtRow> = sqlx::query_as(
            "SELECT id, name, capacity, description, active, created_at, updated_at FROM courts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Court::try_from).transpose()
    }

    async fn timeslot(&mut self, id: TimeslotId) -> StoreResult<Option<Timeslot>> {
        let row: Option<TimeslotRow> = sqlx::query_as(
            "SELECT id, start_time, duration_minutes, active, created_at, updated_at FROM timeslots WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Timeslot::try_from).transpose()
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO reservations ({RESERVATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_uuid())
        .bind(reservation.court_id.as_uuid())
        .bind(reservation.timeslot_id.as_uuid())
        .bind(reservation.date)
        .bind(reservation.status.as_str())
        .bind(reservation.notes.as_deref())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn reservation_for_update(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> =
            sqlx::query_as(&format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query("UPDATE reservations SET status = $2, notes = $3, updated_at = $4 WHERE id = $1")
            .bind(reservation.id.as_uuid())
            .bind(reservation.status.as_str())
            .bind(reservation.notes.as_deref())
            .bind(reservation.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn payment_for_reservation_for_update(&mut self, reservation_id: ReservationId) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE reservation_id = $1 FOR UPDATE"))
                .bind(reservation_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn payment_for_update(&mut self, id: PaymentId) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.reservation_id.as_uuid())
        .bind(to_i64(payment.amount.amount, "amount")?)
        .bind(&payment.amount.currency)
        .bind(payment.status.as_str())
        .bind(payment.payment_method.as_deref())
        .bind(&payment.transaction_id)
        .bind(payment.gateway_token.as_deref())
        .bind(payment.redirect_url.as_deref())
        .bind(payment.paid_at)
        .bind(payment.expires_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            "UPDATE payments
             SET status = $2, payment_method = $3, gateway_token = $4, redirect_url = $5,
                 paid_at = $6, expires_at = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.payment_method.as_deref())
        .bind(payment.gateway_token.as_deref())
        .bind(payment.redirect_url.as_deref())
        .bind(payment.paid_at)
        .bind(payment.expires_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
