//! Business metrics for the booking engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `booking_admissions_total{outcome}` - Admission decisions (`admitted` or an error kind)
//! - `booking_cancellations_total{cause}` - Cancellations (`user`, `payment_failure`)
//! - `booking_reconciliations_total{status}` - Gateway events by mapped outcome
//! - `booking_gateway_calls_total{outcome}` - Checkout token requests (`ok`, `error`, `timeout`, `circuit_open`)
//! - `booking_payment_revenue_total{currency}` - Settled amounts in the smallest currency unit
//! - `booking_overbooked_slots_total` - Confirmations that pushed a slot above capacity
//!
//! ## Histograms
//! - `booking_gateway_duration_seconds` - Gateway round-trip time

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

/// Register all metric descriptions. Call once at startup.
pub fn register_business_metrics() {
    describe_counter!(
        "booking_admissions_total",
        "Reservation admission decisions by outcome"
    );
    describe_counter!(
        "booking_cancellations_total",
        "Reservations cancelled, by cause"
    );
    describe_counter!(
        "booking_reconciliations_total",
        "Payment gateway notifications by mapped status"
    );
    describe_counter!(
        "booking_gateway_calls_total",
        "Payment gateway checkout requests by outcome"
    );
    describe_counter!(
        "booking_payment_revenue_total",
        "Settled payment amounts in the smallest currency unit"
    );
    describe_counter!(
        "booking_overbooked_slots_total",
        "Confirmations that left a slot with more confirmed reservations than capacity"
    );
    describe_histogram!(
        "booking_gateway_duration_seconds",
        "Payment gateway round-trip time"
    );

    tracing::info!("Business metrics registered");
}

/// Record an admission decision (`admitted` or a rejection kind).
pub fn record_admission(outcome: &'static str) {
    metrics::counter!("booking_admissions_total", "outcome" => outcome).increment(1);
}

/// Record a cancellation; `cause` is `user` or `payment_failure`.
pub fn record_cancellation(cause: &'static str) {
    metrics::counter!("booking_cancellations_total", "cause" => cause).increment(1);
}

/// Record a reconciled gateway event by mapped status.
pub fn record_reconciliation(status: &'static str) {
    metrics::counter!("booking_reconciliations_total", "status" => status).increment(1);
}

/// Record one gateway call.
pub fn record_gateway_call(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("booking_gateway_calls_total", "outcome" => outcome).increment(1);
    metrics::histogram!("booking_gateway_duration_seconds").record(elapsed.as_secs_f64());
}

/// Record settled revenue.
pub fn record_revenue(amount: u64, currency: &str) {
    metrics::counter!("booking_payment_revenue_total", "currency" => currency.to_string()).increment(amount);
}

/// Record a confirmation above capacity.
pub fn record_overbooked_slot() {
    metrics::counter!("booking_overbooked_slots_total").increment(1);
}
