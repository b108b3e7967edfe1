//! Shared fixtures for the booking integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use booking::admission::AdmissionRequest;
use booking::catalog::{NewCourt, NewTimeslot};
use booking::config::Config;
use booking::payment_gateway::{
    CheckoutRequest, CheckoutSession, DummyGateway, GatewayClient, GatewayResult, PaymentGateway,
};
use booking::store::InMemoryBookingStore;
use booking::{BookingApp, Court, GatewayError, Reservation, Timeslot, UserId, UserIdentity};
use chrono::NaiveDate;
use courtside_runtime::CircuitBreakerConfig;
use courtside_testing::FixedClock;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// "Today" for every fixture.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

/// Day after [`today`], the default booking date.
pub fn tomorrow() -> NaiveDate {
    today().succ_opt().unwrap()
}

/// Gateway that counts calls and can be switched off.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    calls: AtomicUsize,
    down: AtomicBool,
}

impl ScriptedGateway {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl PaymentGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let down = self.down.load(Ordering::SeqCst);
        Box::pin(async move {
            if down {
                return Err(GatewayError::Rejected {
                    status: 503,
                    body: "maintenance".to_string(),
                });
            }
            DummyGateway::default().create_checkout(request).await
        })
    }
}

/// A booking app over the in-memory store with one court and one timeslot.
pub struct Fixture {
    pub app: BookingApp<InMemoryBookingStore>,
    pub store: InMemoryBookingStore,
    pub clock: FixedClock,
    pub gateway: Arc<ScriptedGateway>,
    pub court: Court,
    pub timeslot: Timeslot,
}

impl Fixture {
    pub async fn new(capacity: u32) -> Self {
        let store = InMemoryBookingStore::new();
        let clock = FixedClock::at_noon(today());
        let gateway = Arc::new(ScriptedGateway::default());
        let client = GatewayClient::new(
            gateway.clone(),
            Duration::from_secs(2),
            CircuitBreakerConfig::builder()
                .failure_threshold(100)
                .open_duration(Duration::from_secs(1))
                .build(),
        );
        let app = BookingApp::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            client,
            Config::for_tests().booking,
        );
        let court = app
            .create_court(NewCourt {
                name: "Studio A".to_string(),
                capacity,
                description: "Reformer studio".to_string(),
            })
            .await
            .unwrap();
        let timeslot = app
            .create_timeslot(NewTimeslot {
                time: "08:00".to_string(),
                duration: None,
            })
            .await
            .unwrap();
        Self {
            app,
            store,
            clock,
            gateway,
            court,
            timeslot,
        }
    }

    pub fn request(&self, date: NaiveDate) -> AdmissionRequest {
        AdmissionRequest {
            court_id: self.court.id,
            timeslot_id: self.timeslot.id,
            date: date.format("%Y-%m-%d").to_string(),
            notes: None,
        }
    }

    pub async fn book(&self, user: &UserIdentity) -> Reservation {
        self.app.admit(user, self.request(tomorrow())).await.unwrap()
    }

    /// Book, open checkout and settle; returns the confirmed reservation.
    pub async fn book_and_pay(&self, user: &UserIdentity) -> Reservation {
        let reservation = self.book(user).await;
        let checkout = self.app.initiate_payment(user, reservation.id).await.unwrap();
        self.app
            .apply_gateway_event(&checkout.payment.transaction_id, "settlement")
            .await
            .unwrap();
        self.app.get_reservation(user, reservation.id).await.unwrap().reservation
    }
}

pub fn user(name: &str) -> UserIdentity {
    UserIdentity::new(UserId::new(), format!("{name}@example.com"))
}
