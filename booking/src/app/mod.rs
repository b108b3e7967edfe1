//! Application facade.
//!
//! [`BookingApp`] owns the store, clock, gateway and booking rules and exposes
//! every operation the HTTP layer (and the integration tests) call. Catalog,
//! availability, admission and reconciliation live in their own modules; the
//! reservation and payment lifecycles are in [`reservations`] and [`payments`].

use courtside_core::environment::Clock;
use courtside_runtime::circuit_breaker::CircuitState;
use courtside_runtime::{HealthCheck, HealthReport};
use std::sync::Arc;

use crate::admission::{self, AdmissionRequest};
use crate::aggregates::{PaymentEnvironment, ReservationEnvironment};
use crate::availability::{self, CourtAvailability, TimeslotAvailability};
use crate::catalog::{self, CourtUpdate, NewCourt, NewTimeslot, TimeslotUpdate};
use crate::config::BookingConfig;
use crate::error::BookingResult;
use crate::payment_gateway::GatewayClient;
use crate::reconciliation::ReconciliationEnv;
use crate::store::BookingStore;
use crate::types::{Court, CourtId, Reservation, Timeslot, TimeslotId, UserIdentity};

pub mod payments;
pub mod reservations;

pub use payments::PaymentInitiation;
pub use reservations::ReservationDetails;

/// The booking engine, generic over its storage backend.
pub struct BookingApp<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    gateway: GatewayClient,
    rules: BookingConfig,
    reservation_env: ReservationEnvironment,
    payment_env: PaymentEnvironment,
}

impl<S> Clone for BookingApp<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            gateway: self.gateway.clone(),
            rules: self.rules.clone(),
            reservation_env: self.reservation_env.clone(),
            payment_env: self.payment_env.clone(),
        }
    }
}

impl<S: BookingStore> BookingApp<S> {
    /// Assemble the engine.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, gateway: GatewayClient, rules: BookingConfig) -> Self {
        let reservation_env = ReservationEnvironment::new(Arc::clone(&clock));
        let payment_env = PaymentEnvironment::new(Arc::clone(&clock), gateway.clone(), rules.payment_expiry());
        Self {
            store,
            clock,
            gateway,
            rules,
            reservation_env,
            payment_env,
        }
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The clock every rule is evaluated against
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Booking rules in force
    #[must_use]
    pub const fn rules(&self) -> &BookingConfig {
        &self.rules
    }

    fn reconciliation_env(&self) -> ReconciliationEnv<'_> {
        ReconciliationEnv {
            reservations: &self.reservation_env,
            payments: &self.payment_env,
        }
    }

    // ---- catalog -----------------------------------------------------------

    /// Active courts by name.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_courts(&self) -> BookingResult<Vec<Court>> {
        catalog::list_active_courts(self.store()).await
    }

    /// Active timeslots by start time.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_timeslots(&self) -> BookingResult<Vec<Timeslot>> {
        catalog::list_active_timeslots(self.store()).await
    }

    /// Whole catalog of courts for administration.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_all_courts(&self) -> BookingResult<Vec<Court>> {
        catalog::list_all_courts(self.store()).await
    }

    /// Whole catalog of timeslots for administration.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_all_timeslots(&self) -> BookingResult<Vec<Timeslot>> {
        catalog::list_all_timeslots(self.store()).await
    }

    /// Court by id.
    ///
    /// # Errors
    ///
    /// `NotFound` or store failures.
    pub async fn get_court(&self, id: CourtId) -> BookingResult<Court> {
        catalog::get_court(self.store(), id).await
    }

    /// Timeslot by id.
    ///
    /// # Errors
    ///
    /// `NotFound` or store failures.
    pub async fn get_timeslot(&self, id: TimeslotId) -> BookingResult<Timeslot> {
        catalog::get_timeslot(self.store(), id).await
    }

    /// Add a court.
    ///
    /// # Errors
    ///
    /// `InvalidInput` or store failures.
    pub async fn create_court(&self, new: NewCourt) -> BookingResult<Court> {
        catalog::create_court(self.store(), self.clock(), new).await
    }

    /// Edit a court.
    ///
    /// # Errors
    ///
    /// `NotFound` or store failures.
    pub async fn update_court(&self, id: CourtId, update: CourtUpdate) -> BookingResult<Court> {
        catalog::update_court(self.store(), self.clock(), id, update).await
    }

    /// Deactivate a court.
    ///
    /// # Errors
    ///
    /// `NotFound` or store failures.
    pub async fn delete_court(&self, id: CourtId) -> BookingResult<()> {
        catalog::delete_court(self.store(), self.clock(), id).await
    }

    /// Add a timeslot.
    ///
    /// # Errors
    ///
    /// `InvalidInput` or store failures.
    pub async fn create_timeslot(&self, new: NewTimeslot) -> BookingResult<Timeslot> {
        catalog::create_timeslot(self.store(), self.clock(), new).await
    }

    /// Edit a timeslot.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidInput` or store failures.
    pub async fn update_timeslot(&self, id: TimeslotId, update: TimeslotUpdate) -> BookingResult<Timeslot> {
        catalog::update_timeslot(self.store(), self.clock(), id, update).await
    }

    /// Deactivate a timeslot.
    ///
    /// # Errors
    ///
    /// `NotFound` or store failures.
    pub async fn delete_timeslot(&self, id: TimeslotId) -> BookingResult<()> {
        catalog::delete_timeslot(self.store(), self.clock(), id).await
    }

    /// Seed the default catalog if it is empty.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn seed_catalog(&self) -> BookingResult<bool> {
        catalog::seed_defaults(self.store(), self.clock()).await
    }

    // ---- availability ------------------------------------------------------

    /// Per-timeslot occupancy on `date`.
    ///
    /// # Errors
    ///
    /// `InvalidDate` or store failures.
    pub async fn timeslot_availability(&self, date: &str) -> BookingResult<Vec<TimeslotAvailability>> {
        availability::timeslot_availability(self.store(), date).await
    }

    /// Per-court availability for one timeslot on `date`.
    ///
    /// # Errors
    ///
    /// `InvalidDate` or store failures.
    pub async fn court_availability(&self, date: &str, timeslot_id: TimeslotId) -> BookingResult<Vec<CourtAvailability>> {
        availability::court_availability(self.store(), date, timeslot_id).await
    }

    /// Bookable dates starting today.
    #[must_use]
    pub fn available_dates(&self) -> Vec<chrono::NaiveDate> {
        availability::available_dates(self.clock(), self.rules.bookable_days)
    }

    // ---- admission ---------------------------------------------------------

    /// Admit a `pending` reservation.
    ///
    /// # Errors
    ///
    /// See [`admission::admit`].
    pub async fn admit(&self, identity: &UserIdentity, request: AdmissionRequest) -> BookingResult<Reservation> {
        admission::admit(self.store(), self.clock(), &self.reservation_env, identity, request).await
    }

    // ---- health ------------------------------------------------------------

    /// Store reachability and gateway circuit state.
    pub async fn health(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => HealthCheck::healthy("store"),
            Err(err) => HealthCheck::unhealthy("store", err.to_string()),
        };
        let component = format!("gateway:{}", self.gateway.name());
        let gateway = match self.gateway.breaker().state().await {
            CircuitState::Closed => HealthCheck::healthy(component),
            CircuitState::HalfOpen => HealthCheck::degraded(component, "circuit half-open"),
            CircuitState::Open => HealthCheck::degraded(component, "circuit open"),
        };
        HealthReport::new(vec![store, gateway], self.clock.now())
    }
}
