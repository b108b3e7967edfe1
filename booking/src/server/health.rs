//! Health endpoints.

use axum::{extract::State, http::StatusCode, Json};
use courtside_runtime::{HealthReport, HealthStatus};
use serde::Serialize;

use crate::app::BookingApp;
use crate::store::BookingStore;

/// Liveness response.
#[derive(Serialize)]
pub struct LivenessResponse {
    /// Always `ok`
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Liveness check. Does not touch dependencies.
///
/// ```bash
/// curl http://localhost:8080/health/live
/// # {"status":"ok","version":"0.1.0"}
/// ```
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Store and gateway health.
///
/// 200 while the service can take bookings (an open gateway circuit only
/// degrades it), 503 when the store is unreachable.
pub async fn health_check<S: BookingStore>(State(app): State<BookingApp<S>>) -> (StatusCode, Json<HealthReport>) {
    let report = app.health().await;
    let status = if report.status == HealthStatus::Unhealthy {
        tracing::warn!(status = %report.status, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}
