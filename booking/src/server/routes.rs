//! Router configuration.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::health::{health_check, liveness};
use crate::api::extractors::{USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use crate::api::{admin, catalog, payments, reservations};
use crate::app::BookingApp;
use crate::store::BookingStore;

/// Build the complete router.
///
/// - `/health`, `/health/live`
/// - `/api/v1/...`: catalog, reservations, payments and catalog admin
pub fn build_router<S: BookingStore>(app: BookingApp<S>) -> Router {
    let api_routes = Router::new()
        // Browsing (no identity)
        .route("/dates", get(catalog::list_dates::<S>))
        .route("/timeslots", get(catalog::list_timeslots::<S>))
        .route("/courts", get(catalog::list_courts::<S>))
        // Reservations
        .route(
            "/reservations",
            post(reservations::create_reservation::<S>).get(reservations::list_reservations::<S>),
        )
        .route("/reservations/:id", get(reservations::get_reservation::<S>))
        .route("/reservations/:id/cancel", put(reservations::cancel_reservation::<S>))
        // Payments
        .route("/payments/create", post(payments::create_payment::<S>))
        .route("/payments/callback", post(payments::payment_callback::<S>))
        .route("/payments/:id", get(payments::get_payment::<S>))
        // Catalog administration
        .route(
            "/admin/courts",
            get(admin::list_courts::<S>).post(admin::create_court::<S>),
        )
        .route(
            "/admin/courts/:id",
            put(admin::update_court::<S>).delete(admin::delete_court::<S>),
        )
        .route(
            "/admin/timeslots",
            get(admin::list_timeslots::<S>).post(admin::create_timeslot::<S>),
        )
        .route(
            "/admin/timeslots/:id",
            put(admin::update_timeslot::<S>).delete(admin::delete_timeslot::<S>),
        );

    Router::new()
        .route("/health", get(health_check::<S>))
        .route("/health/live", get(liveness))
        .nest("/api/v1", api_routes)
        .with_state(app)
        .layer(TraceLayer::new_for_http())
}

/// CORS policy admitting the frontend origin.
///
/// An unparsable origin falls back to a policy that admits no origin.
#[must_use]
pub fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_EMAIL_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(12 * 3600));
    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(frontend_url, "Invalid frontend origin, CORS disabled");
            layer
        }
    }
}
