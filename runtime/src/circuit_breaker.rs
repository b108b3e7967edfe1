//! Circuit breaker for calls to an external dependency.
//!
//! - **Closed**: calls pass through; consecutive failures are counted.
//! - **Open**: calls are rejected immediately until `open_duration` elapses.
//! - **HalfOpen**: trial calls are let through; `success_threshold`
//!   consecutive successes close the circuit, any failure re-opens it.
//!
//! ```rust
//! use courtside_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "payment_gateway",
//!     CircuitBreakerConfig::builder()
//!         .failure_threshold(5)
//!         .open_duration(Duration::from_secs(30))
//!         .build(),
//! );
//! let result = breaker.call(|| async { Ok::<_, String>(1) }).await;
//! assert!(result.is_ok());
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call
    pub open_duration: Duration,
    /// Consecutive trial successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder (5 failures, 60s, 2 successes).
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: u32,
    open_duration: Duration,
    success_threshold: u32,
}

impl CircuitBreakerConfigBuilder {
    /// Set the failure threshold.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open.
    #[must_use]
    pub const fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Set the success threshold for closing from half-open.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub const fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_duration: self.open_duration,
            success_threshold: self.success_threshold,
        }
    }
}

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected
    Open,
    /// Trial calls are allowed
    HalfOpen,
}

impl CircuitState {
    const fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

/// Errors from a call made through the breaker.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the call was not attempted
    #[error("circuit '{name}' is open")]
    Open {
        /// Breaker name
        name: &'static str,
    },
    /// The call was attempted and failed
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// Counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Calls that reached the dependency and succeeded
    pub successes: u64,
    /// Calls that reached the dependency and failed
    pub failures: u64,
    /// Calls rejected while open
    pub rejections: u64,
}

/// Named circuit breaker; clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<Inner>>,
    successes: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        metrics::gauge!("circuit_breaker_state", "name" => name).set(CircuitState::Closed.gauge_value());
        Self {
            name,
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            })),
            successes: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Breaker name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Current state.
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }

    /// Run `operation` unless the circuit is open.
    ///
    /// # Errors
    ///
    /// [`CircuitBreakerError::Open`] when rejected; [`CircuitBreakerError::Inner`]
    /// when the operation itself fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(breaker = self.name, "Circuit open, rejecting call");
            return Err(CircuitBreakerError::Open { name: self.name });
        }

        match operation().await {
            Ok(value) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(value)
            },
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(err))
            },
        }
    }

    /// Force the breaker back to closed.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    async fn admit(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.is_none_or(|at| at.elapsed() >= self.config.open_duration);
                if elapsed {
                    inner.consecutive_successes = 0;
                    self.transition(&mut inner, CircuitState::HalfOpen);
                }
                elapsed
            },
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        if inner.state != to {
            tracing::info!(breaker = self.name, from = ?inner.state, to = ?to, "Circuit breaker transition");
            inner.state = to;
        }
        metrics::gauge!("circuit_breaker_state", "name" => self.name).set(to.gauge_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, open_ms: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::builder()
                .failure_threshold(failures)
                .open_duration(Duration::from_millis(open_ms))
                .success_threshold(successes)
                .build(),
        )
    }

    async fn fail(b: &CircuitBreaker) {
        let _ = b.call(|| async { Err::<(), _>("boom") }).await;
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures_and_rejects() {
        let b = breaker(2, 10_000, 1);
        fail(&b).await;
        assert_eq!(b.state().await, CircuitState::Closed);
        fail(&b).await;
        assert_eq!(b.state().await, CircuitState::Open);

        let result = b.call(|| async { Ok::<_, String>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { name: "test" })));
        assert_eq!(b.stats(), CircuitBreakerStats { successes: 0, failures: 2, rejections: 1 });
    }

    #[tokio::test]
    async fn success_resets_the_failure_streak() {
        let b = breaker(2, 10_000, 1);
        fail(&b).await;
        let _ = b.call(|| async { Ok::<_, String>(()) }).await;
        fail(&b).await;
        assert_eq!(b.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_after_enough_successes() {
        let b = breaker(1, 20, 2);
        fail(&b).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let _ = b.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(b.state().await, CircuitState::HalfOpen);
        let _ = b.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(b.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let b = breaker(1, 20, 2);
        fail(&b).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        fail(&b).await;
        assert_eq!(b.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn reset_closes_an_open_circuit() {
        let b = breaker(1, 10_000, 1);
        fail(&b).await;
        b.reset().await;
        assert_eq!(b.state().await, CircuitState::Closed);
        assert!(b.call(|| async { Ok::<_, String>(()) }).await.is_ok());
    }
}
