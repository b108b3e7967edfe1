//! Reconciliation integration tests.
//!
//! Gateway notifications applied to payment and reservation together:
//! settlement, failure, replays, unknown transactions and rollback.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use booking::reconciliation::GatewayNotification;
use booking::{BookingError, PaymentStatus, ReservationStatus};
use common::{user, Fixture};
use courtside_core::environment::Clock;

/// Settlement marks the payment paid and confirms the reservation.
#[tokio::test]
async fn settlement_pays_and_confirms() {
    let fx = Fixture::new(4).await;
    let member = user("ayu");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();

    let payment = fx
        .app
        .apply_notification(&GatewayNotification {
            order_id: checkout.payment.transaction_id.clone(),
            transaction_status: "settlement".to_string(),
            transaction_id: "mid-7781".to_string(),
            status_code: "200".to_string(),
            gross_amount: "100000.00".to_string(),
            payment_type: Some("bank_transfer".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.paid_at, Some(fx.clock.now()));
    assert_eq!(payment.payment_method.as_deref(), Some("bank_transfer"));
    let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Confirmed);
}

/// `capture` settles like `settlement`.
#[tokio::test]
async fn capture_counts_as_settlement() {
    let fx = Fixture::new(4).await;
    let member = user("bima");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();

    let payment = fx
        .app
        .apply_gateway_event(&checkout.payment.transaction_id, "capture")
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Paid);
}

/// Delivering the same settlement twice changes nothing the second time.
#[tokio::test]
async fn replayed_settlement_is_a_no_op() {
    let fx = Fixture::new(4).await;
    let member = user("citra");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();
    let trx = checkout.payment.transaction_id;

    let first = fx.app.apply_gateway_event(&trx, "settlement").await.unwrap();
    fx.clock.advance(chrono::Duration::minutes(5));
    let second = fx.app.apply_gateway_event(&trx, "settlement").await.unwrap();

    assert_eq!(first, second);
    let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Confirmed);
}

/// Denied, expired and cancelled payments fail and cancel the reservation.
#[tokio::test]
async fn failed_statuses_cancel_the_reservation() {
    let fx = Fixture::new(10).await;

    for status in ["deny", "expire", "cancel"] {
        let member = user(status);
        let reservation = fx.book(&member).await;
        let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();

        let payment = fx
            .app
            .apply_gateway_event(&checkout.payment.transaction_id, status)
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Failed, "status {status}");
        let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
        assert_eq!(details.reservation.status, ReservationStatus::Cancelled, "status {status}");
    }
}

/// A failure arriving after settlement does not undo it.
#[tokio::test]
async fn failure_after_settlement_is_ignored() {
    let fx = Fixture::new(4).await;
    let member = user("dewi");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();
    let trx = checkout.payment.transaction_id;

    fx.app.apply_gateway_event(&trx, "settlement").await.unwrap();
    let payment = fx.app.apply_gateway_event(&trx, "deny").await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Paid);
    let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Confirmed);
}

/// `pending` and unrecognized statuses leave both rows alone.
#[tokio::test]
async fn pending_and_unknown_statuses_change_nothing() {
    let fx = Fixture::new(4).await;
    let member = user("eka");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();
    let trx = checkout.payment.transaction_id;

    for status in ["pending", "refund", ""] {
        let payment = fx.app.apply_gateway_event(&trx, status).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending, "status {status:?}");
    }
    let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Pending);
}

/// Notifications for transactions we never issued are rejected.
#[tokio::test]
async fn unknown_transaction_is_rejected() {
    let fx = Fixture::new(4).await;

    let err = fx
        .app
        .apply_gateway_event("TRX-deadbeef-1700000000", "settlement")
        .await
        .unwrap_err();

    assert_eq!(err, BookingError::PaymentNotFound("TRX-deadbeef-1700000000".to_string()));
}

/// A failed commit rolls back payment and reservation together; redelivery then succeeds.
#[tokio::test]
async fn commit_failure_rolls_back_both_rows() {
    let fx = Fixture::new(4).await;
    let member = user("fajar");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();
    let trx = checkout.payment.transaction_id;

    fx.store.fail_next_commit();
    let err = fx.app.apply_gateway_event(&trx, "settlement").await.unwrap_err();
    assert!(matches!(err, BookingError::StoreUnavailable(_)), "got {err:?}");

    let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Pending);
    assert_eq!(details.payment.unwrap().status, PaymentStatus::Pending);

    fx.app.apply_gateway_event(&trx, "settlement").await.unwrap();
    let details = fx.app.get_reservation(&member, reservation.id).await.unwrap();
    assert_eq!(details.reservation.status, ReservationStatus::Confirmed);
}

/// Settling more pending reservations than there are seats confirms them all;
/// capacity is enforced at admission only.
#[tokio::test]
async fn late_settlements_may_overfill_a_slot() {
    let fx = Fixture::new(1).await;
    let (a, b) = (user("gita"), user("hadi"));
    let first = fx.book(&a).await;
    let second = fx.book(&b).await;
    let pay_a = fx.app.initiate_payment(&a, first.id).await.unwrap();
    let pay_b = fx.app.initiate_payment(&b, second.id).await.unwrap();

    fx.app.apply_gateway_event(&pay_a.payment.transaction_id, "settlement").await.unwrap();
    fx.app.apply_gateway_event(&pay_b.payment.transaction_id, "settlement").await.unwrap();

    for (member, id) in [(&a, first.id), (&b, second.id)] {
        let details = fx.app.get_reservation(member, id).await.unwrap();
        assert_eq!(details.reservation.status, ReservationStatus::Confirmed);
    }
}

/// Expiry only fires once the checkout deadline has passed, and it runs once.
#[tokio::test]
async fn expiry_waits_for_the_deadline() {
    let fx = Fixture::new(4).await;
    let member = user("kadek");
    let reservation = fx.book(&member).await;
    let checkout = fx.app.initiate_payment(&member, reservation.id).await.unwrap();

    let early = fx.app.expire_lapsed_payment(checkout.payment.id).await.unwrap();
    assert_eq!(early, checkout.payment);
    assert_eq!(
        fx.app.get_reservation(&member, reservation.id).await.unwrap().reservation.status,
        ReservationStatus::Pending
    );

    fx.clock.advance(chrono::Duration::hours(24));
    let expired = fx.app.expire_lapsed_payment(checkout.payment.id).await.unwrap();
    assert_eq!(expired.status, PaymentStatus::Expired);
    assert_eq!(expired.updated_at, fx.clock.now());
    assert_eq!(
        fx.app.get_reservation(&member, reservation.id).await.unwrap().reservation.status,
        ReservationStatus::Cancelled
    );

    fx.clock.advance(chrono::Duration::hours(1));
    let again = fx.app.expire_lapsed_payment(checkout.payment.id).await.unwrap();
    assert_eq!(again, expired);
}
