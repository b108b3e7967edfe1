//! Error types.
//!
//! [`BookingError`] is what every service operation returns. Infrastructure
//! failures ([`StoreError`], [`GatewayError`]) convert into it through `From`
//! so services can use `?` on store and gateway calls directly.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{CourtId, ReservationStatus, SlotKey, TimeslotId};

/// Result alias for booking operations
pub type BookingResult<T> = Result<T, BookingError>;

/// Every way a booking operation can be refused or fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Malformed request field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Date is not `YYYY-MM-DD`
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity (court, timeslot, reservation, payment)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Gateway event references an unknown transaction id
    #[error("no payment for transaction '{0}'")]
    PaymentNotFound(String),

    /// Court exists but is deactivated
    #[error("court {0} is not active")]
    CourtInactive(CourtId),

    /// Timeslot exists but is deactivated
    #[error("timeslot {0} is not active")]
    TimeslotInactive(TimeslotId),

    /// Caller does not own the resource
    #[error("not authorized to access this reservation")]
    Unauthorized,

    /// Slot already holds `capacity` confirmed reservations
    #[error("slot {slot} is full (capacity {capacity})")]
    CapacityExceeded {
        /// The full slot
        slot: SlotKey,
        /// Court capacity at admission time
        capacity: u32,
    },

    /// Requested date lies before today
    #[error("cannot book a past date ({0})")]
    PastDate(NaiveDate),

    /// Reservation date lies before today
    #[error("cannot cancel a past reservation")]
    PastReservation,

    /// Reservation already has a settled payment
    #[error("reservation is already paid")]
    AlreadyPaid,

    /// Reservation is cancelled and cannot be paid
    #[error("reservation is cancelled")]
    ReservationCancelled,

    /// Reservation is in a terminal state
    #[error("reservation cannot be cancelled from status '{0}'")]
    NotCancellable(ReservationStatus),

    /// The pending payment lapsed before settlement
    #[error("payment has expired")]
    PaymentExpired,

    /// Payment gateway failed or timed out
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Storage backend failed
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl BookingError {
    /// Stable snake-case code for clients and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidDate(_) => "invalid_date",
            Self::NotFound { .. } => "not_found",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::CourtInactive(_) => "court_inactive",
            Self::TimeslotInactive(_) => "timeslot_inactive",
            Self::Unauthorized => "unauthorized",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::PastDate(_) => "past_date",
            Self::PastReservation => "past_reservation",
            Self::AlreadyPaid => "already_paid",
            Self::ReservationCancelled => "reservation_cancelled",
            Self::NotCancellable(_) => "not_cancellable",
            Self::PaymentExpired => "payment_expired",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Shorthand for [`BookingError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Infrastructure failure rather than a business rejection
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_) | Self::StoreUnavailable(_))
    }
}

/// Storage backend failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Write violates a uniqueness rule
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to a domain value
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Backend refused service (e.g. injected failure in tests)
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Worth retrying (connection-level problems)
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) | Self::Unavailable(_)
        )
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// Payment gateway failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No answer within the configured timeout
    #[error("gateway timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport-level failure
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with a non-success status
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// Gateway answered with something unparseable
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),

    /// Circuit breaker is open
    #[error("gateway circuit is open")]
    CircuitOpen,
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        Self::GatewayUnavailable(err.to_string())
    }
}
