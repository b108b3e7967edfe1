//! Catalog administration (admin role required).
//!
//! - `GET|POST /api/v1/admin/courts`, `PUT|DELETE /api/v1/admin/courts/:id`
//! - `GET|POST /api/v1/admin/timeslots`, `PUT|DELETE /api/v1/admin/timeslots/:id`
//!
//! Listings include deactivated entries.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use super::error::ApiError;
use super::extractors::Admin;
use crate::app::BookingApp;
use crate::catalog::{CourtUpdate, NewCourt, NewTimeslot, TimeslotUpdate};
use crate::store::BookingStore;
use crate::types::{Court, CourtId, Timeslot, TimeslotId};

/// List every court.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn list_courts<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
) -> Result<Json<Vec<Court>>, ApiError> {
    Ok(Json(app.list_all_courts().await?))
}

/// Create a court.
///
/// # Errors
///
/// 400 for invalid fields.
pub async fn create_court<S: BookingStore>(
    Admin(admin): Admin,
    State(app): State<BookingApp<S>>,
    payload: Result<Json<NewCourt>, JsonRejection>,
) -> Result<(StatusCode, Json<Court>), ApiError> {
    let Json(new) = payload?;
    let court = app.create_court(new).await?;
    tracing::info!(admin = %admin.user_id, court_id = %court.id, "Admin created court");
    Ok((StatusCode::CREATED, Json(court)))
}

/// Update a court.
///
/// # Errors
///
/// 404 for an unknown court.
pub async fn update_court<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
    Path(id): Path<CourtId>,
    payload: Result<Json<CourtUpdate>, JsonRejection>,
) -> Result<Json<Court>, ApiError> {
    let Json(update) = payload?;
    Ok(Json(app.update_court(id, update).await?))
}

/// Deactivate a court.
///
/// # Errors
///
/// 404 for an unknown court.
pub async fn delete_court<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
    Path(id): Path<CourtId>,
) -> Result<StatusCode, ApiError> {
    app.delete_court(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List every timeslot.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn list_timeslots<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
) -> Result<Json<Vec<Timeslot>>, ApiError> {
    Ok(Json(app.list_all_timeslots().await?))
}

/// Create a timeslot.
///
/// # Errors
///
/// 400 for invalid fields.
pub async fn create_timeslot<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
    payload: Result<Json<NewTimeslot>, JsonRejection>,
) -> Result<(StatusCode, Json<Timeslot>), ApiError> {
    let Json(new) = payload?;
    Ok((StatusCode::CREATED, Json(app.create_timeslot(new).await?)))
}

/// Update a timeslot.
///
/// # Errors
///
/// 404 for an unknown timeslot, 400 for a malformed time.
pub async fn update_timeslot<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
    Path(id): Path<TimeslotId>,
    payload: Result<Json<TimeslotUpdate>, JsonRejection>,
) -> Result<Json<Timeslot>, ApiError> {
    let Json(update) = payload?;
    Ok(Json(app.update_timeslot(id, update).await?))
}

/// Deactivate a timeslot.
///
/// # Errors
///
/// 404 for an unknown timeslot.
pub async fn delete_timeslot<S: BookingStore>(
    Admin(_): Admin,
    State(app): State<BookingApp<S>>,
    Path(id): Path<TimeslotId>,
) -> Result<StatusCode, ApiError> {
    app.delete_timeslot(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
