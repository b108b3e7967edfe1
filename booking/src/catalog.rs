//! Courts and timeslots.
//!
//! Reads always go to the store. Admin edits never touch reservations that
//! were already admitted, and deletion is soft: the row is deactivated so
//! existing reservations keep their references.

use chrono::NaiveTime;
use courtside_core::environment::Clock;
use serde::Deserialize;

use crate::error::{BookingError, BookingResult};
use crate::store::BookingStore;
use crate::types::{Court, CourtId, Timeslot, TimeslotId};

/// Default length of a session
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// Fields for a new court
#[derive(Debug, Clone, Deserialize)]
pub struct NewCourt {
    /// Display name
    pub name: String,
    /// Confirmed reservations allowed per slot
    pub capacity: u32,
    /// Free text
    #[serde(default)]
    pub description: String,
}

/// Partial court edit; empty strings and zero capacity leave the field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourtUpdate {
    /// New name
    pub name: String,
    /// New capacity
    pub capacity: u32,
    /// New description
    pub description: String,
}

/// Fields for a new timeslot
#[derive(Debug, Clone, Deserialize)]
pub struct NewTimeslot {
    /// Start time, `HH:MM`
    pub time: String,
    /// Length in minutes, 60 when omitted
    #[serde(default)]
    pub duration: Option<u32>,
}

/// Partial timeslot edit; empty time and zero duration leave the field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeslotUpdate {
    /// New start time
    pub time: String,
    /// New length in minutes
    pub duration: u32,
}

fn validate_time(time: &str) -> BookingResult<String> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| BookingError::InvalidInput(format!("invalid time '{time}', expected HH:MM")))
}

/// Active courts ordered by name.
///
/// # Errors
///
/// [`BookingError::StoreUnavailable`] when the store fails.
pub async fn list_active_courts<S: BookingStore>(store: &S) -> BookingResult<Vec<Court>> {
    Ok(store.list_courts(true).await?)
}

/// Active timeslots ordered by start time.
///
/// # Errors
///
/// [`BookingError::StoreUnavailable`] when the store fails.
pub async fn list_active_timeslots<S: BookingStore>(store: &S) -> BookingResult<Vec<Timeslot>> {
    Ok(store.list_timeslots(true).await?)
}

/// Every court, deactivated ones included.
///
/// # Errors
///
/// [`BookingError::StoreUnavailable`] when the store fails.
pub async fn list_all_courts<S: BookingStore>(store: &S) -> BookingResult<Vec<Court>> {
    Ok(store.list_courts(false).await?)
}

/// Every timeslot, deactivated ones included.
///
/// # Errors
///
/// [`BookingError::StoreUnavailable`] when the store fails.
pub async fn list_all_timeslots<S: BookingStore>(store: &S) -> BookingResult<Vec<Timeslot>> {
    Ok(store.list_timeslots(false).await?)
}

/// Court by id, active or not.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown id.
pub async fn get_court<S: BookingStore>(store: &S, id: CourtId) -> BookingResult<Court> {
    store.court(id).await?.ok_or_else(|| BookingError::not_found("court", id))
}

/// Timeslot by id, active or not.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown id.
pub async fn get_timeslot<S: BookingStore>(store: &S, id: TimeslotId) -> BookingResult<Timeslot> {
    store.timeslot(id).await?.ok_or_else(|| BookingError::not_found("timeslot", id))
}

/// Add a court.
///
/// # Errors
///
/// [`BookingError::InvalidInput`] for an empty name or zero capacity.
pub async fn create_court<S: BookingStore>(store: &S, clock: &dyn Clock, new: NewCourt) -> BookingResult<Court> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(BookingError::InvalidInput("court name is required".to_string()));
    }
    if new.capacity == 0 {
        return Err(BookingError::InvalidInput("court capacity must be positive".to_string()));
    }

    let now = clock.now();
    let court = Court {
        id: CourtId::new(),
        name: name.to_string(),
        capacity: new.capacity,
        description: new.description,
        active: true,
        created_at: now,
        updated_at: now,
    };
    store.insert_court(&court).await?;
    tracing::info!(court_id = %court.id, name = %court.name, capacity = court.capacity, "Court created");
    Ok(court)
}

/// Edit a court's name, capacity or description.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown id.
pub async fn update_court<S: BookingStore>(
    store: &S,
    clock: &dyn Clock,
    id: CourtId,
    update: CourtUpdate,
) -> BookingResult<Court> {
    let mut court = get_court(store, id).await?;
    if !update.name.trim().is_empty() {
        court.name = update.name.trim().to_string();
    }
    if update.capacity > 0 {
        court.capacity = update.capacity;
    }
    if !update.description.is_empty() {
        court.description = update.description;
    }
    court.updated_at = clock.now();
    store.update_court(&court).await?;
    tracing::info!(court_id = %court.id, capacity = court.capacity, "Court updated");
    Ok(court)
}

/// Deactivate a court.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown id.
pub async fn delete_court<S: BookingStore>(store: &S, clock: &dyn Clock, id: CourtId) -> BookingResult<()> {
    let mut court = get_court(store, id).await?;
    court.active = false;
    court.updated_at = clock.now();
    store.update_court(&court).await?;
    tracing::info!(court_id = %id, "Court deactivated");
    Ok(())
}

/// Add a timeslot.
///
/// # Errors
///
/// [`BookingError::InvalidInput`] for a malformed time or zero duration.
pub async fn create_timeslot<S: BookingStore>(
    store: &S,
    clock: &dyn Clock,
    new: NewTimeslot,
) -> BookingResult<Timeslot> {
    let time = validate_time(&new.time)?;
    let duration_minutes = new.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
    if duration_minutes == 0 {
        return Err(BookingError::InvalidInput("timeslot duration must be positive".to_string()));
    }

    let now = clock.now();
    let timeslot = Timeslot {
        id: TimeslotId::new(),
        time,
        duration_minutes,
        active: true,
        created_at: now,
        updated_at: now,
    };
    store.insert_timeslot(&timeslot).await?;
    tracing::info!(timeslot_id = %timeslot.id, time = %timeslot.time, "Timeslot created");
    Ok(timeslot)
}

/// Edit a timeslot's time or duration.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown id, [`BookingError::InvalidInput`] for a malformed time.
pub async fn update_timeslot<S: BookingStore>(
    store: &S,
    clock: &dyn Clock,
    id: TimeslotId,
    update: TimeslotUpdate,
) -> BookingResult<Timeslot> {
    let mut timeslot = get_timeslot(store, id).await?;
    if !update.time.trim().is_empty() {
        timeslot.time = validate_time(&update.time)?;
    }
    if update.duration > 0 {
        timeslot.duration_minutes = update.duration;
    }
    timeslot.updated_at = clock.now();
    store.update_timeslot(&timeslot).await?;
    tracing::info!(timeslot_id = %id, time = %timeslot.time, "Timeslot updated");
    Ok(timeslot)
}

/// Deactivate a timeslot.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown id.
pub async fn delete_timeslot<S: BookingStore>(store: &S, clock: &dyn Clock, id: TimeslotId) -> BookingResult<()> {
    let mut timeslot = get_timeslot(store, id).await?;
    timeslot.active = false;
    timeslot.updated_at = clock.now();
    store.update_timeslot(&timeslot).await?;
    tracing::info!(timeslot_id = %id, "Timeslot deactivated");
    Ok(())
}

const DEFAULT_COURTS: [(&str, u32, &str); 3] = [
    ("Studio A", 10, "Reformer Pilates - Premium equipment with personalized instruction"),
    ("Studio B", 8, "Mat Pilates - Classic exercises on comfortable mats"),
    ("Studio C", 12, "Mixed Class - Combination of Reformer and Mat exercises"),
];

const DEFAULT_TIMES: [&str; 7] = ["08:00", "10:00", "12:00", "14:00", "16:00", "18:00", "20:00"];

/// Seed the three studios and the daily schedule into an empty catalog.
///
/// Returns `false` without writing when any court already exists.
///
/// # Errors
///
/// [`BookingError::StoreUnavailable`] when the store fails.
pub async fn seed_defaults<S: BookingStore>(store: &S, clock: &dyn Clock) -> BookingResult<bool> {
    if !store.list_courts(false).await?.is_empty() {
        tracing::debug!("Catalog already populated, skipping seed");
        return Ok(false);
    }

    for (name, capacity, description) in DEFAULT_COURTS {
        create_court(
            store,
            clock,
            NewCourt {
                name: name.to_string(),
                capacity,
                description: description.to_string(),
            },
        )
        .await?;
    }
    for time in DEFAULT_TIMES {
        create_timeslot(
            store,
            clock,
            NewTimeslot {
                time: time.to_string(),
                duration: None,
            },
        )
        .await?;
    }

    tracing::info!(courts = DEFAULT_COURTS.len(), timeslots = DEFAULT_TIMES.len(), "Catalog seeded");
    Ok(true)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::store::InMemoryBookingStore;
    use courtside_testing::test_clock;

    #[tokio::test]
    async fn seeding_is_idempotent_and_ordered() {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();

        assert!(seed_defaults(&store, &clock).await.unwrap());
        assert!(!seed_defaults(&store, &clock).await.unwrap());

        let courts = list_active_courts(&store).await.unwrap();
        let names: Vec<_> = courts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Studio A", "Studio B", "Studio C"]);
        assert_eq!(courts.iter().map(|c| c.capacity).collect::<Vec<_>>(), [10, 8, 12]);

        let times: Vec<_> = list_active_timeslots(&store).await.unwrap().into_iter().map(|t| t.time).collect();
        assert_eq!(times, DEFAULT_TIMES);
    }

    #[tokio::test]
    async fn update_keeps_fields_left_blank() {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();
        let court = create_court(
            &store,
            &clock,
            NewCourt {
                name: "Studio D".into(),
                capacity: 4,
                description: "Small group".into(),
            },
        )
        .await
        .unwrap();

        let updated = update_court(
            &store,
            &clock,
            court.id,
            CourtUpdate {
                capacity: 6,
                ..CourtUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Studio D");
        assert_eq!(updated.capacity, 6);
        assert_eq!(updated.description, "Small group");
    }

    #[tokio::test]
    async fn deleted_court_is_hidden_but_still_readable() {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();
        seed_defaults(&store, &clock).await.unwrap();
        let studio_a = list_active_courts(&store).await.unwrap().remove(0);

        delete_court(&store, &clock, studio_a.id).await.unwrap();

        assert_eq!(list_active_courts(&store).await.unwrap().len(), 2);
        assert!(!get_court(&store, studio_a.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn rejects_bad_catalog_input() {
        let store = InMemoryBookingStore::new();
        let clock = test_clock();

        let zero = NewCourt {
            name: "Studio Z".into(),
            capacity: 0,
            description: String::new(),
        };
        assert!(matches!(create_court(&store, &clock, zero).await, Err(BookingError::InvalidInput(_))));

        let bad_time = NewTimeslot {
            time: "25:00".into(),
            duration: None,
        };
        assert!(matches!(
            create_timeslot(&store, &clock, bad_time).await,
            Err(BookingError::InvalidInput(_))
        ));

        assert!(matches!(
            get_timeslot(&store, TimeslotId::new()).await,
            Err(BookingError::NotFound { entity: "timeslot", .. })
        ));
    }
}
