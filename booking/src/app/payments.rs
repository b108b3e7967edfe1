//! Payment initiation and gateway notifications.
//!
//! Initiation runs in two short transactions with the gateway call between
//! them, so no row lock is held while waiting on the network:
//!
//! 1. lock the reservation and its payment, create (or reuse) the pending
//!    payment, commit;
//! 2. drive the checkout effect against the gateway;
//! 3. lock the payment again and store the issued token, unless another
//!    request already did.
//!
//! A checkout whose deadline has passed is handed to
//! [`reconciliation::expire_lapsed`], which expires the payment and cancels
//! the reservation together.

use courtside_core::environment::Clock;
use courtside_core::reducer::Reducer;
use courtside_runtime::drive;
use serde::Serialize;

use super::BookingApp;
use crate::aggregates::{PaymentAction, PaymentReducer, PaymentState};
use crate::error::{BookingError, BookingResult};
use crate::payment_gateway::{CheckoutRequest, CheckoutSession};
use crate::reconciliation::{self, GatewayNotification};
use crate::store::{BookingStore, BookingTx};
use crate::types::{new_transaction_id, Payment, PaymentId, PaymentStatus, ReservationId, ReservationStatus, UserIdentity};

/// Checkout handed back to the payer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInitiation {
    /// The pending payment
    pub payment: Payment,
    /// Gateway checkout page
    pub redirect_url: String,
    /// Gateway checkout token
    pub token: String,
}

impl PaymentInitiation {
    fn from_payment(payment: Payment) -> BookingResult<Self> {
        match (payment.redirect_url.clone(), payment.gateway_token.clone()) {
            (Some(redirect_url), Some(token)) => Ok(Self {
                payment,
                redirect_url,
                token,
            }),
            _ => Err(BookingError::GatewayUnavailable("no checkout token issued".to_string())),
        }
    }
}

impl<S: BookingStore> BookingApp<S> {
    /// Payment as observed now: a lapsed pending payment reads as expired.
    pub(super) fn observed(&self, mut payment: Payment) -> Payment {
        payment.status = payment.effective_status(self.clock().now());
        payment
    }

    /// Open (or resume) checkout for the caller's reservation.
    ///
    /// At most one payment exists per reservation: retries reuse the pending
    /// row and its transaction id, and a row that already carries a token is
    /// returned without calling the gateway.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized`, `ReservationCancelled`, `AlreadyPaid`,
    /// `PaymentExpired`, `GatewayUnavailable` (the payment stays pending) or
    /// store failures.
    pub async fn initiate_payment(&self, identity: &UserIdentity, reservation_id: ReservationId) -> BookingResult<PaymentInitiation> {
        let reservation = self.owned_reservation(identity, reservation_id).await?;
        let court = self
            .store()
            .court(reservation.court_id)
            .await?
            .ok_or_else(|| BookingError::not_found("court", reservation.court_id))?;
        let timeslot = self
            .store()
            .timeslot(reservation.timeslot_id)
            .await?
            .ok_or_else(|| BookingError::not_found("timeslot", reservation.timeslot_id))?;

        // Phase 1: create or reuse the pending payment.
        let mut tx = self.store().begin().await?;
        let reservation = tx
            .reservation_for_update(reservation_id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", reservation_id))?;
        if reservation.user_id != identity.user_id {
            return Err(BookingError::Unauthorized);
        }
        match reservation.status {
            ReservationStatus::Cancelled => return Err(BookingError::ReservationCancelled),
            ReservationStatus::Confirmed | ReservationStatus::Completed => return Err(BookingError::AlreadyPaid),
            ReservationStatus::Pending => {},
        }

        let existing = tx.payment_for_reservation_for_update(reservation_id).await?;
        let now = self.clock().now();
        let candidate = Payment {
            id: PaymentId::new(),
            reservation_id,
            amount: self.rules.session_price(),
            status: PaymentStatus::Pending,
            payment_method: None,
            transaction_id: new_transaction_id(now),
            gateway_token: None,
            redirect_url: None,
            paid_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        let order = existing.as_ref().unwrap_or(&candidate);
        let request = CheckoutRequest::for_session(&order.transaction_id, order.amount.clone(), identity, &court, &timeslot);

        let mut state = PaymentState::loaded(existing.clone());
        let needs_checkout = !PaymentReducer
            .reduce(
                &mut state,
                PaymentAction::Open {
                    candidate,
                    request: request.clone(),
                },
                &self.payment_env,
            )
            .is_empty();
        let payment = state
            .payment
            .clone()
            .ok_or_else(|| BookingError::InvalidInput("payment was not opened".to_string()))?;

        if let Some(err) = state.last_error {
            drop(tx);
            if err == BookingError::PaymentExpired {
                let expired = self.expire_lapsed_payment(payment.id).await?;
                tracing::info!(payment_id = %expired.id, status = %expired.status, "Checkout deadline passed");
            }
            return Err(err);
        }
        if existing.is_none() {
            tx.insert_payment(&payment).await?;
        }
        tx.commit().await?;
        if existing.is_none() {
            tracing::info!(
                target: "booking::audit",
                payment_id = %payment.id,
                reservation_id = %reservation_id,
                transaction_id = %payment.transaction_id,
                "Payment created"
            );
        }

        if !needs_checkout {
            return PaymentInitiation::from_payment(payment);
        }

        // Phase 2: call the gateway with no locks held.
        let mut checkout = PaymentState::loaded(Some(payment.clone()));
        drive(
            &PaymentReducer,
            &mut checkout,
            PaymentAction::Open {
                candidate: payment.clone(),
                request,
            },
            &self.payment_env,
        )
        .await;
        if let Some(err) = checkout.last_error {
            tracing::warn!(payment_id = %payment.id, error = %err, "Checkout not issued, payment left pending");
            return Err(err);
        }
        let session = checkout
            .payment
            .and_then(|p| p.gateway_token.zip(p.redirect_url))
            .map(|(token, redirect_url)| CheckoutSession { token, redirect_url })
            .ok_or_else(|| BookingError::GatewayUnavailable("no checkout token issued".to_string()))?;

        // Phase 3: record the token on the current row, unless another request already did.
        let mut tx = self.store().begin().await?;
        let current = tx
            .payment_for_update(payment.id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment", payment.id))?;
        let mut state = PaymentState::loaded(Some(current.clone()));
        let _ = PaymentReducer.reduce(&mut state, PaymentAction::GatewayTokenIssued { session }, &self.payment_env);
        let issued = state.payment.unwrap_or_else(|| current.clone());
        if issued != current {
            tx.update_payment(&issued).await?;
            tx.commit().await?;
            tracing::info!(payment_id = %issued.id, expires_at = ?issued.expires_at, "Checkout token stored");
        }
        PaymentInitiation::from_payment(issued)
    }

    /// The caller's payment, as observed now.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Unauthorized` or store failures.
    pub async fn get_payment(&self, identity: &UserIdentity, payment_id: PaymentId) -> BookingResult<Payment> {
        let payment = self
            .store()
            .payment(payment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment", payment_id))?;
        self.owned_reservation(identity, payment.reservation_id).await?;
        Ok(self.observed(payment))
    }

    /// Expire the payment if its checkout deadline has passed, cancelling its
    /// reservation with it; otherwise return it unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` or store failures.
    pub async fn expire_lapsed_payment(&self, payment_id: PaymentId) -> BookingResult<Payment> {
        reconciliation::expire_lapsed(self.store(), &self.reconciliation_env(), payment_id).await
    }

    /// Apply a gateway status to the payment with `transaction_id`.
    ///
    /// # Errors
    ///
    /// `PaymentNotFound` or store failures.
    pub async fn apply_gateway_event(&self, transaction_id: &str, status: &str) -> BookingResult<Payment> {
        reconciliation::apply_gateway_event(self.store(), &self.reconciliation_env(), transaction_id, status).await
    }

    /// Apply a gateway notification body.
    ///
    /// # Errors
    ///
    /// `PaymentNotFound` or store failures.
    pub async fn apply_notification(&self, notification: &GatewayNotification) -> BookingResult<Payment> {
        reconciliation::apply_notification(self.store(), &self.reconciliation_env(), notification).await
    }
}
