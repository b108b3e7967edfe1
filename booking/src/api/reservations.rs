//! Reservation endpoints.
//!
//! # Example
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/reservations \
//!   -H "X-User-Id: 6f1c..." -H "X-User-Email: ana@example.com" \
//!   -H "Content-Type: application/json" \
//!   -d '{"court_id":"...","timeslot_id":"...","date":"2025-03-01"}'
//! ```

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::error::ApiError;
use super::extractors::Identity;
use crate::admission::AdmissionRequest;
use crate::app::{BookingApp, ReservationDetails};
use crate::store::BookingStore;
use crate::types::{CourtId, Reservation, ReservationId, TimeslotId};

/// Request body for creating a reservation
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    /// Court to book
    pub court_id: CourtId,
    /// Timeslot to book
    pub timeslot_id: TimeslotId,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Optional notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Which of the caller's reservations to list
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Everything
    #[default]
    All,
    /// Today onward, cancelled excluded
    Upcoming,
    /// Before today
    Past,
}

/// `GET /reservations` query
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Listing scope (defaults to `all`)
    #[serde(default)]
    pub scope: Scope,
}

/// Create a pending reservation.
///
/// # Errors
///
/// 400 for invalid dates or inactive entries, 404 for unknown ones, 409 when the slot is full.
pub async fn create_reservation<S: BookingStore>(
    Identity(identity): Identity,
    State(app): State<BookingApp<S>>,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let Json(request) = payload?;
    let reservation = app
        .admit(
            &identity,
            AdmissionRequest {
                court_id: request.court_id,
                timeslot_id: request.timeslot_id,
                date: request.date,
                notes: request.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// List the caller's reservations.
///
/// # Errors
///
/// 400 for an unknown scope.
pub async fn list_reservations<S: BookingStore>(
    Identity(identity): Identity,
    State(app): State<BookingApp<S>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let Query(query) = query?;
    let reservations = match query.scope {
        Scope::All => app.list_reservations(&identity).await?,
        Scope::Upcoming => app.upcoming_reservations(&identity).await?,
        Scope::Past => app.past_reservations(&identity).await?,
    };
    Ok(Json(reservations))
}

/// Fetch one of the caller's reservations with court, timeslot and payment.
///
/// # Errors
///
/// 404 for an unknown id, 403 for someone else's reservation.
pub async fn get_reservation<S: BookingStore>(
    Identity(identity): Identity,
    State(app): State<BookingApp<S>>,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationDetails>, ApiError> {
    Ok(Json(app.get_reservation(&identity, id).await?))
}

/// Cancel one of the caller's reservations.
///
/// # Errors
///
/// 403 for someone else's reservation, 409 when already terminal, 400 when in the past.
pub async fn cancel_reservation<S: BookingStore>(
    Identity(identity): Identity,
    State(app): State<BookingApp<S>>,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, ApiError> {
    Ok(Json(app.cancel(&identity, id).await?))
}
