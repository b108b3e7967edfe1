//! Payment endpoints.
//!
//! `POST /payments/callback` is called by the gateway and carries no
//! identity. Unknown transactions answer 404 so the gateway's delivery log
//! shows them.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extractors::Identity;
use crate::app::{BookingApp, PaymentInitiation};
use crate::reconciliation::GatewayNotification;
use crate::store::BookingStore;
use crate::types::{Payment, PaymentId, PaymentStatus, ReservationId};

/// Request body for initiating a payment
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    /// Reservation to pay for
    pub reservation_id: ReservationId,
}

/// Acknowledgement returned to the gateway
#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// Our transaction id
    pub order_id: String,
    /// Payment status after the notification was applied
    pub payment_status: PaymentStatus,
}

/// Open (or reuse) the checkout for a reservation.
///
/// # Errors
///
/// 409 when the reservation is cancelled, already paid or the checkout expired;
/// 502 when the gateway could not issue a checkout.
pub async fn create_payment<S: BookingStore>(
    Identity(identity): Identity,
    State(app): State<BookingApp<S>>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentInitiation>), ApiError> {
    let Json(request) = payload?;
    let initiation = app.initiate_payment(&identity, request.reservation_id).await?;
    Ok((StatusCode::CREATED, Json(initiation)))
}

/// Apply a gateway status notification.
///
/// # Errors
///
/// 404 for an unknown transaction, 400 for a malformed body.
pub async fn payment_callback<S: BookingStore>(
    State(app): State<BookingApp<S>>,
    payload: Result<Json<GatewayNotification>, JsonRejection>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let Json(notification) = payload?;
    if notification.order_id.trim().is_empty() {
        return Err(ApiError::bad_request("order_id is required"));
    }
    let payment = app.apply_notification(&notification).await?;
    Ok(Json(CallbackResponse {
        order_id: payment.transaction_id,
        payment_status: payment.status,
    }))
}

/// Fetch a payment on one of the caller's reservations.
///
/// # Errors
///
/// 404 for an unknown id, 403 for someone else's payment.
pub async fn get_payment<S: BookingStore>(
    Identity(identity): Identity,
    State(app): State<BookingApp<S>>,
    Path(id): Path<PaymentId>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(app.get_payment(&identity, id).await?))
}
