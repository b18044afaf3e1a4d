//! Circuit breaker implementation.

use crate::audit;
use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{BreakerMetrics, BreakerSnapshot, BreakerState, StateKind};

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::time::Instant;

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open and the call was not attempted.
    #[error("circuit open for '{name}'")]
    Open {
        /// Name of the guarded dependency.
        name: String,
        /// When the circuit may recover.
        recovery_hint: Option<String>,
    },

    /// The call was attempted and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns `true` if the call was short-circuited.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    metrics: BreakerMetrics,
    last_failure: Option<DateTime<Utc>>,
}

/// Outcome of asking the breaker whether a call may proceed.
enum Admission {
    Allowed { probe: bool },
    Rejected { recovery_hint: String },
}

/// Stateful guard around one named remote dependency.
///
/// All callers share one instance per dependency; state and counters live
/// behind a single lock so concurrent updates are never lost.
///
/// # States
///
/// - **Closed**: calls pass through, consecutive failures are counted.
/// - **Open**: calls are short-circuited until the cooldown elapses.
/// - **Half-Open**: a limited number of probes decide between closing and
///   reopening.
///
/// # Example
///
/// ```rust
/// use nutriscan::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
///
/// # async fn demo() {
/// let breaker = CircuitBreaker::new("classifier", CircuitBreakerConfig::classifier());
/// let value = breaker
///     .call_or_else(|| async { Err::<u8, &str>("down") }, || 0)
///     .await;
/// assert_eq!(value, Err("down"));
/// # }
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named dependency.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::closed(),
                metrics: BreakerMetrics::default(),
                last_failure: None,
            }),
        }
    }

    /// Returns the dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the current state.
    pub fn state(&self) -> BreakerState {
        self.lock().state.clone()
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Returns `true` if the circuit is open and still cooling down.
    pub fn is_open(&self) -> bool {
        matches!(self.lock().state, BreakerState::Open { until, .. } if Instant::now() < until)
    }

    /// Returns a point-in-time view for health reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let (failure_count, success_count) = match inner.state {
            BreakerState::Closed { failure_count } => (failure_count, 0),
            BreakerState::HalfOpen { success_count, .. } => (0, success_count),
            BreakerState::Open { .. } => (0, 0),
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state.kind(),
            failure_count,
            success_count,
            last_failure: inner.last_failure,
            metrics: inner.metrics.clone(),
        }
    }

    /// Forces the circuit open for one cooldown period.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        let from = inner.state.kind();
        inner.state = BreakerState::Open {
            opened_at: now,
            until: now + self.config.open_duration,
        };
        inner.metrics.times_opened += 1;
        drop(inner);
        self.log_transition(from, StateKind::Open);
    }

    /// Forces the circuit closed.
    pub fn force_close(&self) {
        let mut inner = self.lock();
        let from = inner.state.kind();
        inner.state = BreakerState::closed();
        drop(inner);
        self.log_transition(from, StateKind::Closed);
    }

    /// Resets the state and counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::closed();
        inner.metrics = BreakerMetrics::default();
        inner.last_failure = None;
    }

    /// Runs `operation` if the circuit admits it.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probe = match self.admit() {
            Admission::Allowed { probe } => probe,
            Admission::Rejected { recovery_hint } => {
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                    recovery_hint: Some(recovery_hint),
                });
            }
        };

        let mut guard = ProbeGuard {
            breaker: self,
            probe,
            settled: false,
        };
        let result = operation().await;
        guard.settled = true;

        match result {
            Ok(value) => {
                self.record_success(probe);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(probe);
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Runs `operation`, substituting `fallback` when the circuit is open.
    ///
    /// If the circuit is open the operation is not invoked. If the operation
    /// fails and that failure leaves the circuit open, the fallback is
    /// returned instead of the error; otherwise the error propagates.
    pub async fn call_or_else<F, Fut, T, E, FB>(&self, operation: F, fallback: FB) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> T,
    {
        match self.call(operation).await {
            Ok(value) => Ok(value),
            Err(BreakerError::Open { .. }) => Ok(fallback()),
            Err(BreakerError::Inner(err)) => {
                if self.lock().state.is_open() {
                    Ok(fallback())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state.clone() {
            BreakerState::Closed { .. } => Admission::Allowed { probe: false },

            BreakerState::Open { until, .. } => {
                if now >= until {
                    inner.state = BreakerState::HalfOpen {
                        success_count: 0,
                        probes_in_flight: 1,
                    };
                    drop(inner);
                    self.log_transition(StateKind::Open, StateKind::HalfOpen);
                    Admission::Allowed { probe: true }
                } else {
                    inner.metrics.record_rejected();
                    Admission::Rejected {
                        recovery_hint: format!("may recover in {:?}", until - now),
                    }
                }
            }

            BreakerState::HalfOpen {
                success_count,
                probes_in_flight,
            } => {
                if probes_in_flight < self.config.half_open_max_probes {
                    inner.state = BreakerState::HalfOpen {
                        success_count,
                        probes_in_flight: probes_in_flight + 1,
                    };
                    Admission::Allowed { probe: true }
                } else {
                    inner.metrics.record_rejected();
                    Admission::Rejected {
                        recovery_hint: "probe in progress".to_string(),
                    }
                }
            }
        }
    }

    fn record_success(&self, probe: bool) {
        let mut inner = self.lock();
        inner.metrics.record_success();

        match inner.state.clone() {
            BreakerState::Closed { .. } => {
                inner.state = BreakerState::closed();
            }

            BreakerState::HalfOpen {
                success_count,
                probes_in_flight,
            } => {
                let successes = success_count + 1;
                if successes >= self.config.success_threshold {
                    inner.state = BreakerState::closed();
                    inner.metrics.times_closed += 1;
                    drop(inner);
                    self.log_transition(StateKind::HalfOpen, StateKind::Closed);
                } else {
                    inner.state = BreakerState::HalfOpen {
                        success_count: successes,
                        probes_in_flight: release(probes_in_flight, probe),
                    };
                }
            }

            // A call admitted before the circuit opened; the cooldown stands.
            BreakerState::Open { .. } => {}
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.metrics.record_failure();
        inner.last_failure = Some(Utc::now());
        let now = Instant::now();

        let from = match inner.state.clone() {
            BreakerState::Closed { failure_count } => {
                let failures = failure_count + 1;
                if failures < self.config.failure_threshold {
                    inner.state = BreakerState::Closed {
                        failure_count: failures,
                    };
                    return;
                }
                StateKind::Closed
            }
            BreakerState::HalfOpen { .. } => StateKind::HalfOpen,
            BreakerState::Open { .. } => {
                if probe {
                    tracing::debug!(breaker = %self.name, "late probe failure while open");
                }
                return;
            }
        };

        inner.state = BreakerState::Open {
            opened_at: now,
            until: now + self.config.open_duration,
        };
        inner.metrics.times_opened += 1;
        drop(inner);
        self.log_transition(from, StateKind::Open);
    }

    /// Frees a half-open probe slot whose call was dropped before finishing.
    fn abandon_probe(&self) {
        let mut inner = self.lock();
        if let BreakerState::HalfOpen {
            success_count,
            probes_in_flight,
        } = inner.state.clone()
        {
            inner.state = BreakerState::HalfOpen {
                success_count,
                probes_in_flight: release(probes_in_flight, true),
            };
        }
    }

    fn log_transition(&self, from: StateKind, to: StateKind) {
        if from == to {
            return;
        }
        match to {
            StateKind::Open => tracing::warn!(
                breaker = %self.name,
                from = from.name(),
                cooldown_ms = self.config.open_duration.as_millis() as u64,
                "circuit opened"
            ),
            _ => tracing::info!(
                breaker = %self.name,
                from = from.name(),
                to = to.name(),
                "circuit state changed"
            ),
        }
        audit::emit_breaker_transition(&self.name, from, to);
    }
}

fn release(probes_in_flight: u32, probe: bool) -> u32 {
    if probe {
        probes_in_flight.saturating_sub(1)
    } else {
        probes_in_flight
    }
}

struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.abandon_probe();
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state().name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_open_duration(Duration::from_secs(60)),
        )
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) {
        let _ = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> bool {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await
            .is_ok()
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        assert!(breaker.state().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await;
        fail(&breaker, &calls).await;
        assert!(succeed(&breaker, &calls).await);
        fail(&breaker, &calls).await;

        assert_eq!(breaker.state().failure_count(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_successes() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        breaker.force_open();

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(succeed(&breaker, &calls).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(breaker.state().is_half_open());

        assert!(succeed(&breaker, &calls).await);
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.state().failure_count(), Some(0));
        assert_eq!(breaker.metrics().times_closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        breaker.force_open();

        tokio::time::advance(Duration::from_secs(61)).await;
        fail(&breaker, &calls).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(breaker.is_open());
        assert!(breaker.snapshot().last_failure.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_or_else_uses_fallback_when_open() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);

        let first: Result<u8, &str> = breaker
            .call_or_else(|| async { Err("boom") }, || 9)
            .await;
        assert_eq!(first, Err("boom"));

        fail(&breaker, &calls).await;
        let third: Result<u8, &str> = breaker
            .call_or_else(|| async { Err("boom") }, || 9)
            .await;
        assert_eq!(third, Ok(9));

        let open: Result<u8, &str> = breaker
            .call_or_else(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                },
                || 7,
            )
            .await;
        assert_eq!(open, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_frees_slot() {
        let breaker = breaker();
        breaker.force_open();
        tokio::time::advance(Duration::from_secs(61)).await;

        let pending = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, &str>(())
            }),
        )
        .await;
        assert!(pending.is_err());

        let calls = AtomicU32::new(0);
        assert!(succeed(&breaker, &calls).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_are_counted() {
        let breaker = std::sync::Arc::new(CircuitBreaker::new(
            "shared",
            CircuitBreakerConfig::new().with_failure_threshold(50),
        ));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let breaker = std::sync::Arc::clone(&breaker);
                tokio::spawn(async move {
                    let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(breaker.state().failure_count(), Some(20));
        assert_eq!(breaker.metrics().failed_calls, 20);
    }
}
