//! Dependency health reporting.

use crate::circuit_breaker::CircuitBreaker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Health of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The check succeeded.
    Healthy,
    /// The check failed but requests still reach the dependency, or a local
    /// fallback is answering for it.
    Degraded,
    /// The check failed and the breaker is short-circuiting requests.
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Result of one health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Dependency name.
    pub service: String,
    /// Outcome.
    pub status: HealthStatus,
    /// Time the check took.
    pub latency: Duration,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
    /// Failure description, if any.
    pub details: Option<String>,
}

impl ServiceHealth {
    /// Reports a dependency with no remote backend configured.
    pub fn not_configured(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Degraded,
            latency: Duration::ZERO,
            checked_at: Utc::now(),
            details: Some("not configured, local fallback in use".to_string()),
        }
    }
}

/// Runs `check` and classifies the outcome.
///
/// A failure is [`HealthStatus::Unhealthy`] when `breaker` is open and
/// [`HealthStatus::Degraded`] otherwise.
pub async fn check_service<F, E>(
    service: impl Into<String>,
    breaker: Option<&CircuitBreaker>,
    check: F,
) -> ServiceHealth
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    let started = Instant::now();
    let outcome = check.await;
    let latency = started.elapsed();

    let (status, details) = match outcome {
        Ok(()) => (HealthStatus::Healthy, None),
        Err(err) => {
            let status = if breaker.is_some_and(CircuitBreaker::is_open) {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            };
            (status, Some(err.to_string()))
        }
    };

    ServiceHealth {
        service: service.into(),
        status,
        latency,
        checked_at: Utc::now(),
        details,
    }
}
