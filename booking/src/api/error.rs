//! HTTP error responses.
//!
//! [`ApiError`] carries a status, a stable code and a user-facing message,
//! and renders as `{"code": ..., "message": ...}`. Every [`BookingError`]
//! converts into one, so handlers can use `?` on service calls.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::error::BookingError;

/// Error type returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
    source: Option<anyhow::Error>,
}

impl ApiError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach an internal cause (logged, never sent to the client).
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 Unauthorized
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    /// 403 Forbidden
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 500 Internal Server Error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// HTTP status
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

const fn status_for(err: &BookingError) -> StatusCode {
    match err {
        BookingError::InvalidInput(_)
        | BookingError::InvalidDate(_)
        | BookingError::CourtInactive(_)
        | BookingError::TimeslotInactive(_)
        | BookingError::PastDate(_)
        | BookingError::PastReservation => StatusCode::BAD_REQUEST,
        BookingError::NotFound { .. } | BookingError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Unauthorized => StatusCode::FORBIDDEN,
        BookingError::CapacityExceeded { .. }
        | BookingError::AlreadyPaid
        | BookingError::ReservationCancelled
        | BookingError::NotCancellable(_)
        | BookingError::PaymentExpired => StatusCode::CONFLICT,
        BookingError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        BookingError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let status = status_for(&err);
        let code = err.kind().to_ascii_uppercase();
        if err.is_infrastructure() {
            // Infrastructure detail stays in the logs.
            let message = match err {
                BookingError::GatewayUnavailable(_) => "payment gateway unavailable, please retry",
                _ => "service temporarily unavailable",
            };
            return Self::new(status, code, message).with_source(anyhow::Error::new(err));
        }
        Self::new(status, code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(status = %self.status, code = %self.code, message = %self.message, "Request failed"),
            }
        }

        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
