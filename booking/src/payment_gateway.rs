//! Payment gateway integration.
//!
//! The gateway issues a checkout token and redirect URL for a payment; the
//! payer completes checkout on the gateway's page and the gateway later
//! reports the outcome through a notification (see
//! [`reconciliation`](crate::reconciliation)).
//!
//! Two implementations:
//! - [`MidtransSnapGateway`]: Midtrans Snap over HTTPS
//! - [`DummyGateway`]: issues local URLs, used whenever no server key is configured

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::GatewayError;
use crate::metrics;
use crate::types::{Court, Money, Timeslot, UserIdentity};
use courtside_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

/// Payment gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Phone number sent when the payer's is unknown
pub const DEFAULT_CUSTOMER_PHONE: &str = "08123456789";

/// Everything the gateway needs to open a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Our transaction id, echoed back in notifications as `order_id`
    pub order_id: String,
    /// Amount to charge
    pub amount: Money,
    /// Payer's display name
    pub customer_name: String,
    /// Payer's email
    pub customer_email: String,
    /// Payer's phone
    pub customer_phone: String,
    /// Line item id
    pub item_id: String,
    /// Line item description
    pub item_name: String,
}

impl CheckoutRequest {
    /// Build the single-item checkout for one session on `court` at `timeslot`.
    #[must_use]
    pub fn for_session(order_id: &str, amount: Money, payer: &UserIdentity, court: &Court, timeslot: &Timeslot) -> Self {
        let customer_name = payer
            .email
            .split('@')
            .next()
            .filter(|local| !local.is_empty())
            .unwrap_or("Customer")
            .to_string();
        Self {
            order_id: order_id.to_string(),
            amount,
            customer_name,
            customer_email: payer.email.clone(),
            customer_phone: DEFAULT_CUSTOMER_PHONE.to_string(),
            item_id: format!("COURT-{}", court.id),
            item_name: format!("Pilates Class - {} at {}", court.name, timeslot.time),
        }
    }
}

/// Checkout credentials issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Checkout token
    pub token: String,
    /// Page the payer is sent to
    pub redirect_url: String,
}

/// Payment gateway trait
///
/// Abstraction over hosted-checkout processors.
pub trait PaymentGateway: Send + Sync {
    /// Short name for logs and health
    fn name(&self) -> &'static str;

    /// Open a hosted checkout for `request`
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be reached or rejects the request
    fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>>;
}

/// Gateway used when no credentials are configured: always succeeds with a local URL.
#[derive(Clone, Debug)]
pub struct DummyGateway {
    base_url: String,
}

impl DummyGateway {
    /// Creates a dummy gateway whose checkout pages live under `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::default())
    }
}

impl Default for DummyGateway {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

impl PaymentGateway for DummyGateway {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        Box::pin(async move {
            tracing::info!(order_id = %request.order_id, amount = %request.amount, "Dummy checkout issued");
            Ok(CheckoutSession {
                token: format!("DUMMY_TOKEN_{}", request.order_id),
                redirect_url: format!("{base_url}/payment/dummy?transaction_id={}", request.order_id),
            })
        })
    }
}

// ---- Midtrans Snap wire types ---------------------------------------------

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: SnapTransactionDetails<'a>,
    customer_details: SnapCustomerDetails<'a>,
    item_details: [SnapItem<'a>; 1],
}

#[derive(Serialize)]
struct SnapTransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: u64,
}

#[derive(Serialize)]
struct SnapCustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
}

#[derive(Serialize)]
struct SnapItem<'a> {
    id: &'a str,
    price: u64,
    quantity: u32,
    name: &'a str,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

/// Midtrans Snap client.
#[derive(Clone, Debug)]
pub struct MidtransSnapGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl MidtransSnapGateway {
    /// Creates a client for `base_url` (sandbox or production Snap endpoint).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            server_key: server_key.into(),
        })
    }
}

impl PaymentGateway for MidtransSnapGateway {
    fn name(&self) -> &'static str {
        "midtrans"
    }

    fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        let client = self.client.clone();
        let url = format!("{}/transactions", self.base_url.trim_end_matches('/'));
        let server_key = self.server_key.clone();

        Box::pin(async move {
            let body = SnapRequest {
                transaction_details: SnapTransactionDetails {
                    order_id: &request.order_id,
                    gross_amount: request.amount.amount,
                },
                customer_details: SnapCustomerDetails {
                    first_name: &request.customer_name,
                    email: &request.customer_email,
                    phone: &request.customer_phone,
                },
                item_details: [SnapItem {
                    id: &request.item_id,
                    price: request.amount.amount,
                    quantity: 1,
                    name: &request.item_name,
                }],
            };

            let response = client
                .post(&url)
                .basic_auth(&server_key, Some(""))
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !(status == reqwest::StatusCode::OK || status == reqwest::StatusCode::CREATED) {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let snap: SnapResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

            tracing::info!(order_id = %request.order_id, "Midtrans checkout issued");
            Ok(CheckoutSession {
                token: snap.token,
                redirect_url: snap.redirect_url,
            })
        })
    }
}

/// Gateway plus the policies every call goes through.
#[derive(Clone)]
pub struct GatewayClient {
    gateway: Arc<dyn PaymentGateway>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("gateway", &self.gateway.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Wrap `gateway` with a timeout and a circuit breaker.
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, timeout: Duration, breaker: CircuitBreakerConfig) -> Self {
        Self {
            gateway,
            breaker: CircuitBreaker::new("payment_gateway", breaker),
            timeout,
        }
    }

    /// Pick the gateway from configuration: Midtrans when a server key is set, dummy otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> GatewayResult<Self> {
        let gateway: Arc<dyn PaymentGateway> = if config.gateway_configured() {
            Arc::new(MidtransSnapGateway::new(
                &config.gateway.base_url,
                &config.gateway.server_key,
                config.gateway.timeout(),
            )?)
        } else {
            tracing::warn!("MIDTRANS_SERVER_KEY not set, using dummy payment gateway");
            Arc::new(DummyGateway::new(config.server.frontend_url.trim_end_matches('/')))
        };
        let breaker = CircuitBreakerConfig::builder()
            .failure_threshold(config.gateway.circuit_failure_threshold)
            .open_duration(Duration::from_secs(config.gateway.circuit_open_secs))
            .success_threshold(1)
            .build();
        Ok(Self::new(gateway, config.gateway.timeout(), breaker))
    }

    /// Name of the wrapped gateway
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Circuit breaker guarding the gateway
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Request a checkout, bounded by the timeout and the circuit breaker.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Timeout`], [`GatewayError::CircuitOpen`], or the gateway's own error.
    pub async fn request_checkout(&self, request: CheckoutRequest) -> GatewayResult<CheckoutSession> {
        let started = Instant::now();
        let timeout = self.timeout;
        let call = self.gateway.create_checkout(request);

        let result = self
            .breaker
            .call(|| async move {
                tokio::time::timeout(timeout, call)
                    .await
                    .unwrap_or_else(|_| Err(GatewayError::Timeout(timeout)))
            })
            .await;

        let (outcome, result) = match result {
            Ok(session) => ("ok", Ok(session)),
            Err(CircuitBreakerError::Open { .. }) => ("circuit_open", Err(GatewayError::CircuitOpen)),
            Err(CircuitBreakerError::Inner(err @ GatewayError::Timeout(_))) => ("timeout", Err(err)),
            Err(CircuitBreakerError::Inner(err)) => ("error", Err(err)),
        };
        metrics::record_gateway_call(outcome, started.elapsed());
        if let Err(err) = &result {
            tracing::warn!(gateway = self.gateway.name(), outcome, error = %err, "Checkout request failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{CourtId, TimeslotId, UserId};
    use chrono::Utc;

    struct SlowGateway;

    impl PaymentGateway for SlowGateway {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn create_checkout(
            &self,
            _request: CheckoutRequest,
        ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(GatewayError::InvalidResponse("unreachable".into()))
            })
        }
    }

    fn request() -> CheckoutRequest {
        let now = Utc::now();
        let court = Court {
            id: CourtId::new(),
            name: "Studio A".into(),
            capacity: 10,
            description: String::new(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        let timeslot = Timeslot {
            id: TimeslotId::new(),
            time: "08:00".into(),
            duration_minutes: 60,
            active: true,
            created_at: now,
            updated_at: now,
        };
        let payer = UserIdentity::new(UserId::new(), "rani@example.com");
        CheckoutRequest::for_session("TRX-abcd1234-1", Money::default_session_price(), &payer, &court, &timeslot)
    }

    #[test]
    fn session_checkout_describes_the_class() {
        let req = request();
        assert_eq!(req.customer_name, "rani");
        assert_eq!(req.customer_phone, DEFAULT_CUSTOMER_PHONE);
        assert!(req.item_id.starts_with("COURT-"));
        assert_eq!(req.item_name, "Pilates Class - Studio A at 08:00");
    }

    #[tokio::test]
    async fn dummy_gateway_issues_local_checkout() {
        let session = DummyGateway::default().create_checkout(request()).await.unwrap();
        assert_eq!(session.token, "DUMMY_TOKEN_TRX-abcd1234-1");
        assert_eq!(
            session.redirect_url,
            "http://localhost:3000/payment/dummy?transaction_id=TRX-abcd1234-1"
        );
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let client = GatewayClient::new(
            Arc::new(SlowGateway),
            Duration::from_millis(20),
            CircuitBreakerConfig::default(),
        );
        let err = client.request_checkout(request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[tokio::test]
    async fn repeated_failures_open_the_circuit() {
        let client = GatewayClient::new(
            Arc::new(SlowGateway),
            Duration::from_millis(5),
            CircuitBreakerConfig::builder().failure_threshold(2).build(),
        );
        for _ in 0..2 {
            let _ = client.request_checkout(request()).await;
        }
        let err = client.request_checkout(request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen));
    }
}
