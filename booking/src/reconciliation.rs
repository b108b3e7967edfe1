//! Gateway notification handling.
//!
//! A notification moves the payment and its reservation together, in one
//! store transaction that locks the slot, then the reservation, then the
//! payment. Notifications are replayed by gateways; once a payment is
//! terminal, further notifications change nothing. A lapsed checkout
//! deadline is reconciled the same way through [`expire_lapsed`].

use courtside_core::reducer::Reducer;
use serde::{Deserialize, Serialize};

use crate::aggregates::{
    PaymentAction, PaymentEnvironment, PaymentReducer, PaymentState, ReservationAction, ReservationEnvironment,
    ReservationReducer, ReservationState,
};
use crate::error::{BookingError, BookingResult};
use crate::metrics;
use crate::store::{BookingStore, BookingTx};
use crate::types::{Payment, PaymentId, PaymentStatus, ReservationId, ReservationStatus};

/// Notification body posted by Midtrans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayNotification {
    /// Our transaction id
    pub order_id: String,
    /// Gateway status (`capture`, `settlement`, `pending`, `deny`, `expire`, `cancel`, ...)
    pub transaction_status: String,
    /// The gateway's own transaction id
    pub transaction_id: String,
    /// HTTP-like status code reported by the gateway
    pub status_code: String,
    /// Charged amount as a decimal string
    pub gross_amount: String,
    /// Payment method (`bank_transfer`, `gopay`, ...)
    pub payment_type: Option<String>,
}

/// What a gateway status means for the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// `capture`, `settlement`
    Settled,
    /// `pending`
    Pending,
    /// `deny`, `expire`, `cancel`
    Failed,
    /// Anything else
    Unrecognized,
}

impl GatewayOutcome {
    /// Map a gateway status string.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "capture" | "settlement" => Self::Settled,
            "pending" => Self::Pending,
            "deny" | "expire" | "cancel" => Self::Failed,
            _ => Self::Unrecognized,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Settled => "settled",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Unrecognized => "ignored",
        }
    }
}

/// Dependencies reconciliation reduces with
#[derive(Clone)]
pub struct ReconciliationEnv<'a> {
    /// Reservation reducer environment
    pub reservations: &'a ReservationEnvironment,
    /// Payment reducer environment
    pub payments: &'a PaymentEnvironment,
}

/// Apply a notification body.
///
/// # Errors
///
/// See [`apply_gateway_event`].
pub async fn apply_notification<S: BookingStore>(
    store: &S,
    env: &ReconciliationEnv<'_>,
    notification: &GatewayNotification,
) -> BookingResult<Payment> {
    apply(
        store,
        env,
        &notification.order_id,
        &notification.transaction_status,
        notification.payment_type.clone(),
    )
    .await
}

/// Apply gateway status `status` to the payment with `transaction_id`.
///
/// Returns the payment as persisted afterwards.
///
/// # Errors
///
/// [`BookingError::PaymentNotFound`] for an unknown transaction id,
/// [`BookingError::StoreUnavailable`] when the store fails (nothing is written).
pub async fn apply_gateway_event<S: BookingStore>(
    store: &S,
    env: &ReconciliationEnv<'_>,
    transaction_id: &str,
    status: &str,
) -> BookingResult<Payment> {
    apply(store, env, transaction_id, status, None).await
}

/// Expire a pending payment whose checkout deadline has elapsed, cancelling
/// its reservation in the same transaction.
///
/// Returns the payment as persisted afterwards; a payment that is not
/// pending, or whose deadline has not passed, is returned unchanged.
///
/// # Errors
///
/// [`BookingError::NotFound`] for an unknown payment,
/// [`BookingError::StoreUnavailable`] when the store fails (nothing is written).
pub async fn expire_lapsed<S: BookingStore>(
    store: &S,
    env: &ReconciliationEnv<'_>,
    payment_id: PaymentId,
) -> BookingResult<Payment> {
    let payment = store
        .payment(payment_id)
        .await?
        .ok_or_else(|| BookingError::not_found("payment", payment_id))?;
    if payment.status != PaymentStatus::Pending || payment.effective_status(env.payments.clock.now()) != PaymentStatus::Expired
    {
        return Ok(payment);
    }
    reconcile(store, env, payment, Transition::Expire, "deadline").await
}

async fn apply<S: BookingStore>(
    store: &S,
    env: &ReconciliationEnv<'_>,
    transaction_id: &str,
    status: &str,
    payment_method: Option<String>,
) -> BookingResult<Payment> {
    let outcome = GatewayOutcome::from_status(status);

    let Some(payment) = store.payment_by_transaction(transaction_id).await? else {
        tracing::warn!(transaction_id, status, "Gateway notification for unknown transaction");
        metrics::record_reconciliation("unknown_transaction");
        return Err(BookingError::PaymentNotFound(transaction_id.to_string()));
    };

    let transition = match outcome {
        GatewayOutcome::Pending => {
            tracing::debug!(transaction_id, "Payment still pending at gateway");
            metrics::record_reconciliation(outcome.label());
            return Ok(payment);
        },
        GatewayOutcome::Unrecognized => {
            tracing::info!(transaction_id, status, "Ignoring unrecognized gateway status");
            metrics::record_reconciliation(outcome.label());
            return Ok(payment);
        },
        GatewayOutcome::Settled => Transition::Settle { payment_method },
        GatewayOutcome::Failed => Transition::Fail {
            reason: status.to_string(),
        },
    };
    reconcile(store, env, payment, transition, status).await
}

/// What a reconciliation does to a payment and its reservation
enum Transition {
    Settle { payment_method: Option<String> },
    Fail { reason: String },
    Expire,
}

impl Transition {
    const fn label(&self) -> &'static str {
        match self {
            Self::Settle { .. } => "settled",
            Self::Fail { .. } => "failed",
            Self::Expire => "expired",
        }
    }

    const fn cancellation_cause(&self) -> &'static str {
        match self {
            Self::Expire => "payment_expired",
            Self::Settle { .. } | Self::Fail { .. } => "payment_failure",
        }
    }

    fn into_actions(self, reservation_id: ReservationId) -> (PaymentAction, ReservationAction) {
        match self {
            Self::Settle { payment_method } => (
                PaymentAction::Settle { payment_method },
                ReservationAction::Confirm { reservation_id },
            ),
            Self::Fail { reason } => (
                PaymentAction::Fail { reason },
                ReservationAction::CancelByPaymentFailure { reservation_id },
            ),
            Self::Expire => (
                PaymentAction::MarkExpired,
                ReservationAction::CancelByPaymentFailure { reservation_id },
            ),
        }
    }
}

/// Apply `transition` to `payment` and its reservation under the slot,
/// reservation and payment locks. `cause` is what triggered it, for the audit log.
async fn reconcile<S: BookingStore>(
    store: &S,
    env: &ReconciliationEnv<'_>,
    payment: Payment,
    transition: Transition,
    cause: &str,
) -> BookingResult<Payment> {
    let transaction_id = payment.transaction_id.as_str();
    let reservation = store
        .reservation(payment.reservation_id)
        .await?
        .ok_or_else(|| BookingError::not_found("reservation", payment.reservation_id))?;
    let slot = reservation.slot();

    let mut tx = store.begin().await?;
    tx.lock_slot(&slot).await?;
    let court = tx.court(reservation.court_id).await?;
    let reservation = tx
        .reservation_for_update(reservation.id)
        .await?
        .ok_or_else(|| BookingError::not_found("reservation", payment.reservation_id))?;
    let locked = tx
        .payment_for_update(payment.id)
        .await?
        .ok_or_else(|| BookingError::PaymentNotFound(transaction_id.to_string()))?;

    let label = transition.label();
    let cancellation_cause = transition.cancellation_cause();
    let settles = matches!(transition, Transition::Settle { .. });
    let (payment_action, reservation_action) = transition.into_actions(reservation.id);

    let mut payment_state = PaymentState::loaded(Some(locked.clone()));
    let _ = PaymentReducer.reduce(&mut payment_state, payment_action, env.payments);
    let updated = payment_state.payment.unwrap_or_else(|| locked.clone());

    if updated == locked {
        if settles && locked.status != PaymentStatus::Paid {
            tracing::warn!(
                target: "booking::audit",
                transaction_id,
                payment_id = %locked.id,
                status = %locked.status,
                "Settlement reported for a closed payment, refund required"
            );
            metrics::record_reconciliation("late_settlement");
        } else {
            tracing::debug!(
                transaction_id,
                status = %locked.status,
                "Payment already terminal, notification is a no-op"
            );
            metrics::record_reconciliation("replayed");
        }
        return Ok(locked);
    }

    let mut reservation_state = ReservationState::loaded(reservation.clone());
    let _ = ReservationReducer.reduce(&mut reservation_state, reservation_action, env.reservations);
    if let Some(err) = reservation_state.last_error {
        return Err(err);
    }
    let reservation_after = reservation_state.reservation.unwrap_or_else(|| reservation.clone());

    tx.update_payment(&updated).await?;
    if reservation_after != reservation {
        tx.update_reservation(&reservation_after).await?;
    }

    let confirmed_now = reservation_after.status == ReservationStatus::Confirmed && reservation.status != ReservationStatus::Confirmed;
    let overbooked = if confirmed_now {
        let confirmed = tx.count_confirmed(&slot).await?;
        court
            .as_ref()
            .filter(|c| confirmed > u64::from(c.capacity))
            .map(|c| (confirmed, c.capacity))
    } else {
        None
    };

    tx.commit().await?;

    tracing::info!(
        target: "booking::audit",
        transaction_id,
        payment_id = %updated.id,
        from = %locked.status,
        to = %updated.status,
        cause,
        "Payment reconciled"
    );
    if reservation_after.status != reservation.status {
        tracing::info!(
            target: "booking::audit",
            reservation_id = %reservation.id,
            from = %reservation.status,
            to = %reservation_after.status,
            "Reservation reconciled"
        );
        if reservation_after.status == ReservationStatus::Cancelled {
            metrics::record_cancellation(cancellation_cause);
        }
    }
    if let Some((confirmed, capacity)) = overbooked {
        tracing::warn!(slot = %slot, confirmed, capacity, "Confirmation left slot above capacity");
        metrics::record_overbooked_slot();
    }
    if settles {
        metrics::record_revenue(updated.amount.amount, &updated.amount.currency);
    }
    metrics::record_reconciliation(label);

    Ok(updated)
}
