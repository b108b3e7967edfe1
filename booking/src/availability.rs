//! Read-only occupancy views for the booking UI.
//!
//! Two different counting rules are in play and both are kept as is:
//! per-timeslot availability compares non-cancelled reservations across all
//! courts with the number of active courts, while per-court availability
//! treats a court as taken once it holds any non-cancelled reservation.
//! Neither view is what admission enforces (confirmed count against capacity).

use chrono::NaiveDate;
use courtside_core::environment::Clock;
use serde::Serialize;

use crate::error::BookingResult;
use crate::store::BookingStore;
use crate::types::{parse_date, Court, Timeslot, TimeslotId};

/// Days offered by [`available_dates`] when the caller does not say
pub const DEFAULT_BOOKABLE_DAYS: u32 = 30;

/// Occupancy of one timeslot on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeslotAvailability {
    /// The timeslot
    #[serde(flatten)]
    pub timeslot: Timeslot,
    /// Non-cancelled reservations across all courts
    pub booked_count: u64,
    /// Active courts minus `booked_count`; may be negative
    pub available_courts: i64,
    /// `available_courts > 0`
    pub available: bool,
}

/// Whether one court is free for a timeslot on a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourtAvailability {
    /// The court
    #[serde(flatten)]
    pub court: Court,
    /// No non-cancelled reservation holds this court
    pub available: bool,
}

/// Occupancy of every active timeslot on `date`.
///
/// # Errors
///
/// [`BookingError::InvalidDate`](crate::BookingError::InvalidDate) for a malformed date.
pub async fn timeslot_availability<S: BookingStore>(store: &S, date: &str) -> BookingResult<Vec<TimeslotAvailability>> {
    let date = parse_date(date)?;
    let active_courts = i64::try_from(store.list_courts(true).await?.len()).unwrap_or(i64::MAX);

    let mut result = Vec::new();
    for timeslot in store.list_timeslots(true).await? {
        let booked_count = store.count_booked(date, timeslot.id).await?;
        let available_courts = active_courts.saturating_sub(i64::try_from(booked_count).unwrap_or(i64::MAX));
        result.push(TimeslotAvailability {
            timeslot,
            booked_count,
            available_courts,
            available: available_courts > 0,
        });
    }
    Ok(result)
}

/// Every active court with its availability for `timeslot_id` on `date`.
///
/// # Errors
///
/// [`BookingError::InvalidDate`](crate::BookingError::InvalidDate) for a malformed date.
pub async fn court_availability<S: BookingStore>(
    store: &S,
    date: &str,
    timeslot_id: TimeslotId,
) -> BookingResult<Vec<CourtAvailability>> {
    let date = parse_date(date)?;
    let booked = store.booked_court_ids(date, timeslot_id).await?;

    Ok(store
        .list_courts(true)
        .await?
        .into_iter()
        .map(|court| CourtAvailability {
            available: !booked.contains(&court.id),
            court,
        })
        .collect())
}

/// Today and the following `days - 1` days.
#[must_use]
pub fn available_dates(clock: &dyn Clock, days: u32) -> Vec<NaiveDate> {
    clock.today().iter_days().take(days as usize).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::catalog;
    use crate::error::BookingError;
    use crate::store::{BookingTx, InMemoryBookingStore};
    use crate::types::{Reservation, ReservationId, ReservationStatus, UserId};
    use courtside_testing::test_clock;

    async fn reserve(store: &InMemoryBookingStore, court: &Court, timeslot: &Timeslot, date: NaiveDate, status: ReservationStatus) {
        let now = test_clock().now();
        let mut tx = store.begin().await.unwrap();
        tx.insert_reservation(&Reservation {
            id: ReservationId::new(),
            user_id: UserId::new(),
            court_id: court.id,
            timeslot_id: timeslot.id,
            date,
            status,
            notes: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_reservations_do_not_occupy() {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();
        catalog::seed_defaults(&store, &clock).await.unwrap();
        let courts = catalog::list_active_courts(&store).await.unwrap();
        let slots = catalog::list_active_timeslots(&store).await.unwrap();
        let date = clock.today();

        reserve(&store, &courts[0], &slots[0], date, ReservationStatus::Pending).await;
        reserve(&store, &courts[1], &slots[0], date, ReservationStatus::Cancelled).await;

        let by_slot = timeslot_availability(&store, "2025-01-01").await.unwrap();
        assert_eq!(by_slot.len(), 7);
        assert_eq!(by_slot[0].booked_count, 1);
        assert_eq!(by_slot[0].available_courts, 2);
        assert!(by_slot[0].available);
        assert_eq!(by_slot[1].booked_count, 0);

        let by_court = court_availability(&store, "2025-01-01", slots[0].id).await.unwrap();
        let free: Vec<_> = by_court.iter().map(|c| (c.court.name.as_str(), c.available)).collect();
        assert_eq!(free, [("Studio A", false), ("Studio B", true), ("Studio C", true)]);
    }

    #[tokio::test]
    async fn overbooked_timeslot_goes_negative() {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();
        catalog::seed_defaults(&store, &clock).await.unwrap();
        let courts = catalog::list_active_courts(&store).await.unwrap();
        let slot = catalog::list_active_timeslots(&store).await.unwrap().remove(0);

        for _ in 0..4 {
            reserve(&store, &courts[0], &slot, clock.today(), ReservationStatus::Confirmed).await;
        }

        let by_slot = timeslot_availability(&store, "2025-01-01").await.unwrap();
        assert_eq!(by_slot[0].available_courts, -1);
        assert!(!by_slot[0].available);
    }

    #[tokio::test]
    async fn malformed_date_is_rejected() {
        let store = InMemoryBookingStore::new();
        assert!(matches!(
            timeslot_availability(&store, "01-01-2025").await,
            Err(BookingError::InvalidDate(_))
        ));
        assert!(matches!(
            court_availability(&store, "tomorrow", TimeslotId::new()).await,
            Err(BookingError::InvalidDate(_))
        ));
    }

    #[test]
    fn dates_start_today() {
        let clock = test_clock();
        let dates = available_dates(&clock, 3);
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[0], clock.today());
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
    }
}
