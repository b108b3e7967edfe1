//! Domain types for the booking engine.
//!
//! Identifiers, catalog entities (courts, timeslots), reservations, payments
//! and the small value objects shared between them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BookingError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a court (studio)
    CourtId
);
uuid_id!(
    /// Unique identifier for a daily timeslot
    TimeslotId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_id!(
    /// Unique identifier for a payment
    PaymentId
);
uuid_id!(
    /// Unique identifier for a user, issued by the identity provider
    UserId
);

// ============================================================================
// Value objects
// ============================================================================

/// Amount in the smallest unit of `currency`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Integer amount (e.g. rupiah, cents)
    pub amount: u64,
    /// ISO 4217 currency code
    pub currency: String,
}

impl Money {
    /// Creates a money value
    #[must_use]
    pub fn new(amount: u64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Default price of one session: 100 000 IDR
    #[must_use]
    pub fn default_session_price() -> Self {
        Self::new(100_000, "IDR")
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Authenticated caller, as asserted by the upstream identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User identifier
    pub user_id: UserId,
    /// Contact email, forwarded to the payment gateway
    pub email: String,
}

impl UserIdentity {
    /// Creates an identity
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
        }
    }
}

/// Capacity-enforcement key: one court, one timeslot, one calendar date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// Court
    pub court_id: CourtId,
    /// Timeslot
    pub timeslot_id: TimeslotId,
    /// Calendar date
    pub date: NaiveDate,
}

impl SlotKey {
    /// Stable textual key used for store-level locking
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("slot:{}:{}:{}", self.court_id, self.timeslot_id, self.date)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.court_id, self.timeslot_id, self.date)
    }
}

/// Wire format of booking dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
///
/// [`BookingError::InvalidDate`] when the text is not a valid date in that format.
pub fn parse_date(text: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|_| BookingError::InvalidDate(text.to_string()))
}

// ============================================================================
// Catalog
// ============================================================================

/// A bookable resource with a fixed per-slot capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    /// Identifier
    pub id: CourtId,
    /// Display name
    pub name: String,
    /// Maximum confirmed reservations per slot
    pub capacity: u32,
    /// Free text
    pub description: String,
    /// Inactive courts accept no new reservations
    pub active: bool,
    /// Created
    pub created_at: DateTime<Utc>,
    /// Updated
    pub updated_at: DateTime<Utc>,
}

/// A named daily time window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeslot {
    /// Identifier
    pub id: TimeslotId,
    /// Start time, `HH:MM`
    pub time: String,
    /// Length in minutes
    pub duration_minutes: u32,
    /// Inactive timeslots accept no new reservations
    pub active: bool,
    /// Created
    pub created_at: DateTime<Utc>,
    /// Updated
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Reservations
// ============================================================================

/// Lifecycle of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created, awaiting payment
    Pending,
    /// Paid; counts toward capacity
    Confirmed,
    /// Cancelled by the owner or by a failed payment (terminal)
    Cancelled,
    /// Session took place (terminal)
    Completed,
}

impl ReservationStatus {
    /// Terminal states are never left
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Storage / wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(BookingError::InvalidInput(format!("unknown reservation status '{other}'"))),
        }
    }
}

/// A user's claim on one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Identifier
    pub id: ReservationId,
    /// Owner
    pub user_id: UserId,
    /// Court
    pub court_id: CourtId,
    /// Timeslot
    pub timeslot_id: TimeslotId,
    /// Calendar date of the session
    pub date: NaiveDate,
    /// Current status
    pub status: ReservationStatus,
    /// Free text from the user
    pub notes: Option<String>,
    /// Created
    pub created_at: DateTime<Utc>,
    /// Updated
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// The slot this reservation occupies
    #[must_use]
    pub const fn slot(&self) -> SlotKey {
        SlotKey {
            court_id: self.court_id,
            timeslot_id: self.timeslot_id,
            date: self.date,
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Lifecycle of a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting the gateway
    Pending,
    /// Settled (terminal)
    Paid,
    /// Denied or cancelled by the gateway (terminal)
    Failed,
    /// Lapsed before settlement (terminal)
    Expired,
}

impl PaymentStatus {
    /// Terminal states are never left
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Storage / wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            other => Err(BookingError::InvalidInput(format!("unknown payment status '{other}'"))),
        }
    }
}

/// The monetary settlement attempt for one reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Identifier
    pub id: PaymentId,
    /// Reservation being paid for
    pub reservation_id: ReservationId,
    /// Amount charged
    pub amount: Money,
    /// Persisted status (see [`Payment::effective_status`])
    pub status: PaymentStatus,
    /// Method reported by the gateway, if any
    pub payment_method: Option<String>,
    /// Gateway correlation id, unique across payments
    pub transaction_id: String,
    /// Checkout token issued by the gateway
    pub gateway_token: Option<String>,
    /// Checkout URL issued by the gateway
    pub redirect_url: Option<String>,
    /// When the gateway reported settlement
    pub paid_at: Option<DateTime<Utc>>,
    /// Deadline for settlement, set once the gateway issued a token
    pub expires_at: Option<DateTime<Utc>>,
    /// Created
    pub created_at: DateTime<Utc>,
    /// Updated
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Status as observed at `now`: a pending payment past its deadline reads as expired.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> PaymentStatus {
        match (self.status, self.expires_at) {
            (PaymentStatus::Pending, Some(deadline)) if deadline <= now => PaymentStatus::Expired,
            (status, _) => status,
        }
    }

    /// Whether the gateway already issued checkout credentials
    #[must_use]
    pub const fn has_gateway_token(&self) -> bool {
        self.gateway_token.is_some() && self.redirect_url.is_some()
    }
}

/// Generate a gateway correlation id: `TRX-<8 hex>-<unix seconds>`.
#[must_use]
pub fn new_transaction_id(now: DateTime<Utc>) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("TRX-{}-{}", &simple[..8], now.timestamp())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn parse_date_accepts_iso_days_only() {
        assert_eq!(parse_date("2025-03-09").unwrap(), NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert!(matches!(parse_date("09/03/2025"), Err(BookingError::InvalidDate(_))));
        assert!(matches!(parse_date("2025-02-30"), Err(BookingError::InvalidDate(_))));
        assert!(matches!(parse_date(""), Err(BookingError::InvalidDate(_))));
    }

    #[test]
    fn transaction_id_shape() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let id = new_transaction_id(now);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TRX");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[2], now.timestamp().to_string());
    }

    #[test]
    fn pending_payment_past_deadline_reads_expired() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let mut payment = Payment {
            id: PaymentId::new(),
            reservation_id: ReservationId::new(),
            amount: Money::default_session_price(),
            status: PaymentStatus::Pending,
            payment_method: None,
            transaction_id: new_transaction_id(now),
            gateway_token: None,
            redirect_url: None,
            paid_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(payment.effective_status(now), PaymentStatus::Pending);

        payment.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(payment.effective_status(now), PaymentStatus::Expired);

        payment.status = PaymentStatus::Paid;
        assert_eq!(payment.effective_status(now), PaymentStatus::Paid);
    }

    #[test]
    fn status_names_round_trip_through_strings() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn slot_lock_key_is_stable() {
        let key = SlotKey {
            court_id: CourtId::from_uuid(Uuid::nil()),
            timeslot_id: TimeslotId::from_uuid(Uuid::nil()),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };
        assert_eq!(
            key.lock_key(),
            "slot:00000000-0000-0000-0000-000000000000:00000000-0000-0000-0000-000000000000:2025-01-01"
        );
    }
}
