//! Catalog and availability endpoints (no identity required).
//!
//! - `GET /api/v1/dates` - bookable dates
//! - `GET /api/v1/timeslots[?date=YYYY-MM-DD]` - timeslots, with occupancy when a date is given
//! - `GET /api/v1/courts[?date=YYYY-MM-DD&timeslot_id=...]` - courts, with availability when both are given

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::app::BookingApp;
use crate::availability::{CourtAvailability, TimeslotAvailability};
use crate::store::BookingStore;
use crate::types::{Court, Timeslot, TimeslotId};

/// A plain catalog listing, or the same entries with availability
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T, A> {
    /// Catalog entries only
    Catalog(Vec<T>),
    /// Entries with occupancy for the requested date
    Availability(Vec<A>),
}

/// `GET /timeslots` query
#[derive(Debug, Deserialize)]
pub struct TimeslotQuery {
    /// Date to report occupancy for
    pub date: Option<String>,
}

/// `GET /courts` query
#[derive(Debug, Deserialize)]
pub struct CourtQuery {
    /// Date to report availability for
    pub date: Option<String>,
    /// Timeslot to report availability for
    pub timeslot_id: Option<TimeslotId>,
}

/// Bookable dates response
#[derive(Debug, Serialize)]
pub struct DatesResponse {
    /// Dates from today on
    pub dates: Vec<NaiveDate>,
}

/// List bookable dates.
pub async fn list_dates<S: BookingStore>(State(app): State<BookingApp<S>>) -> Json<DatesResponse> {
    Json(DatesResponse {
        dates: app.available_dates(),
    })
}

/// List active timeslots, with occupancy when `date` is given.
///
/// # Errors
///
/// 400 for a malformed date.
pub async fn list_timeslots<S: BookingStore>(
    State(app): State<BookingApp<S>>,
    query: Result<Query<TimeslotQuery>, QueryRejection>,
) -> Result<Json<Listing<Timeslot, TimeslotAvailability>>, ApiError> {
    let Query(query) = query?;
    let listing = match query.date {
        Some(date) => Listing::Availability(app.timeslot_availability(&date).await?),
        None => Listing::Catalog(app.list_timeslots().await?),
    };
    Ok(Json(listing))
}

/// List active courts, with availability when `date` and `timeslot_id` are given.
///
/// # Errors
///
/// 400 for a malformed date or a date without a timeslot.
pub async fn list_courts<S: BookingStore>(
    State(app): State<BookingApp<S>>,
    query: Result<Query<CourtQuery>, QueryRejection>,
) -> Result<Json<Listing<Court, CourtAvailability>>, ApiError> {
    let Query(query) = query?;
    let listing = match (query.date, query.timeslot_id) {
        (Some(date), Some(timeslot_id)) => Listing::Availability(app.court_availability(&date, timeslot_id).await?),
        (None, None) => Listing::Catalog(app.list_courts().await?),
        _ => return Err(ApiError::bad_request("date and timeslot_id must be given together")),
    };
    Ok(Json(listing))
}
