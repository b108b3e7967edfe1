//! Payment aggregate.
//!
//! A payment starts `pending` and needs checkout credentials from the
//! gateway. [`PaymentAction::Open`] describes that call as an effect; its
//! outcome comes back as [`PaymentAction::GatewayTokenIssued`] or
//! [`PaymentAction::GatewayRequestFailed`]. Settlement, failure and expiry
//! only ever move a pending payment; on a terminal payment they do nothing.
//! A lapsed deadline is only reported by `Open`; persisting it is
//! [`PaymentAction::MarkExpired`], which reconciliation applies.

use chrono::{DateTime, Duration, Utc};
use courtside_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use std::sync::Arc;

use crate::error::BookingError;
use crate::payment_gateway::{CheckoutRequest, CheckoutSession, GatewayClient};
use crate::types::{Payment, PaymentStatus};

// ============================================================================
// Actions
// ============================================================================

/// Inputs to the payment state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentAction {
    /// Start (or resume) checkout. `candidate` is used when no payment exists yet.
    Open {
        /// Payment to create if the reservation has none
        candidate: Payment,
        /// What to send to the gateway
        request: CheckoutRequest,
    },

    /// Gateway issued checkout credentials
    GatewayTokenIssued {
        /// Token and redirect URL
        session: CheckoutSession,
    },

    /// Gateway call failed or timed out
    GatewayRequestFailed {
        /// Diagnostic message
        reason: String,
    },

    /// Gateway reported settlement
    Settle {
        /// Method the payer used, if reported
        payment_method: Option<String>,
    },

    /// Gateway reported denial, expiry or cancellation
    Fail {
        /// Gateway status that caused the failure
        reason: String,
    },

    /// Checkout deadline elapsed without settlement; ignored before the deadline
    MarkExpired,
}

// ============================================================================
// State & Environment
// ============================================================================

/// One payment as loaded by the service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentState {
    /// The payment, once opened or loaded
    pub payment: Option<Payment>,
    /// Why the last action was rejected
    pub last_error: Option<BookingError>,
}

impl PaymentState {
    /// State for an existing payment row, or none
    #[must_use]
    pub const fn loaded(payment: Option<Payment>) -> Self {
        Self {
            payment,
            last_error: None,
        }
    }

    /// Persisted status, if a payment is loaded
    #[must_use]
    pub fn status(&self) -> Option<PaymentStatus> {
        self.payment.as_ref().map(|p| p.status)
    }
}

/// Environment dependencies for the payment aggregate
#[derive(Clone)]
pub struct PaymentEnvironment {
    /// Clock for timestamps and expiry
    pub clock: Arc<dyn Clock>,
    /// Gateway behind timeout and circuit breaker
    pub gateway: GatewayClient,
    /// Settlement window granted once a token is issued
    pub expiry: Duration,
}

impl PaymentEnvironment {
    /// Creates a new `PaymentEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, gateway: GatewayClient, expiry: Duration) -> Self {
        Self { clock, gateway, expiry }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the payment aggregate
#[derive(Clone, Copy, Debug, Default)]
pub struct PaymentReducer;

impl PaymentReducer {
    /// Creates a new `PaymentReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn transition(payment: &mut Payment, to: PaymentStatus, now: DateTime<Utc>) {
        tracing::debug!(
            payment_id = %payment.id,
            transaction_id = %payment.transaction_id,
            from = %payment.status,
            to = %to,
            "Payment transition"
        );
        payment.status = to;
        payment.updated_at = now;
    }

    fn checkout(gateway: GatewayClient, request: CheckoutRequest) -> Effect<PaymentAction> {
        Effect::future(async move {
            Some(match gateway.request_checkout(request).await {
                Ok(session) => PaymentAction::GatewayTokenIssued { session },
                Err(err) => PaymentAction::GatewayRequestFailed {
                    reason: err.to_string(),
                },
            })
        })
    }

    /// Pending payment to act on, or `None` when there is nothing to do.
    fn pending(state: &mut PaymentState) -> Option<&mut Payment> {
        match state.payment.as_mut() {
            Some(payment) if payment.status == PaymentStatus::Pending => Some(payment),
            Some(_) => None,
            None => {
                state.last_error = Some(BookingError::InvalidInput("no payment loaded".to_string()));
                None
            },
        }
    }
}

impl Reducer for PaymentReducer {
    type State = PaymentState;
    type Action = PaymentAction;
    type Environment = PaymentEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        state.last_error = None;
        let now = env.clock.now();

        match action {
            PaymentAction::Open { candidate, request } => {
                let payment = state.payment.get_or_insert(candidate);
                match payment.effective_status(now) {
                    PaymentStatus::Paid => state.last_error = Some(BookingError::AlreadyPaid),
                    PaymentStatus::Failed => state.last_error = Some(BookingError::ReservationCancelled),
                    PaymentStatus::Expired => state.last_error = Some(BookingError::PaymentExpired),
                    PaymentStatus::Pending if payment.has_gateway_token() => {},
                    PaymentStatus::Pending => {
                        return smallvec![Self::checkout(env.gateway.clone(), request)];
                    },
                }
            },

            PaymentAction::GatewayTokenIssued { session } => {
                if let Some(payment) = Self::pending(state) {
                    if payment.has_gateway_token() {
                        return SmallVec::new();
                    }
                    payment.gateway_token = Some(session.token);
                    payment.redirect_url = Some(session.redirect_url);
                    payment.expires_at = Some(now + env.expiry);
                    payment.updated_at = now;
                }
            },

            PaymentAction::GatewayRequestFailed { reason } => {
                state.last_error = Some(BookingError::GatewayUnavailable(reason));
            },

            PaymentAction::Settle { payment_method } => {
                if let Some(payment) = Self::pending(state) {
                    Self::transition(payment, PaymentStatus::Paid, now);
                    payment.paid_at = Some(now);
                    if payment_method.is_some() {
                        payment.payment_method = payment_method;
                    }
                }
            },

            PaymentAction::Fail { reason } => {
                if let Some(payment) = Self::pending(state) {
                    tracing::debug!(payment_id = %payment.id, reason, "Payment failed at gateway");
                    Self::transition(payment, PaymentStatus::Failed, now);
                }
            },

            PaymentAction::MarkExpired => {
                if let Some(payment) = Self::pending(state) {
                    if payment.effective_status(now) == PaymentStatus::Expired {
                        Self::transition(payment, PaymentStatus::Expired, now);
                    }
                }
            },
        }

        SmallVec::new()
    }
}
