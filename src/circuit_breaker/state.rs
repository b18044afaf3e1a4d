//! Circuit breaker state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// The current state of a circuit breaker.
#[derive(Debug, Clone)]
pub enum BreakerState {
    /// Calls pass through.
    Closed {
        /// Consecutive failures.
        failure_count: u32,
    },

    /// Calls are short-circuited.
    Open {
        /// When the circuit opened.
        opened_at: Instant,
        /// When the next call may probe the dependency.
        until: Instant,
    },

    /// A limited number of probe calls pass through.
    HalfOpen {
        /// Consecutive successful probes.
        success_count: u32,
        /// Probes currently in flight.
        probes_in_flight: u32,
    },
}

impl BreakerState {
    /// Creates a new closed state.
    pub fn closed() -> Self {
        Self::Closed { failure_count: 0 }
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen { .. })
    }

    /// Returns the consecutive failure count if closed.
    pub fn failure_count(&self) -> Option<u32> {
        match self {
            Self::Closed { failure_count } => Some(*failure_count),
            _ => None,
        }
    }

    /// Returns the public kind of this state.
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Closed { .. } => StateKind::Closed,
            Self::Open { .. } => StateKind::Open,
            Self::HalfOpen { .. } => StateKind::HalfOpen,
        }
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::closed()
    }
}

/// State of a breaker without its bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateKind {
    /// Calls pass through.
    Closed,
    /// Calls are short-circuited.
    Open,
    /// Probing for recovery.
    HalfOpen,
}

impl StateKind {
    /// Returns the name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Counters about circuit breaker behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Calls attempted, including rejected ones.
    pub total_calls: u64,
    /// Calls that succeeded.
    pub successful_calls: u64,
    /// Calls that failed.
    pub failed_calls: u64,
    /// Calls short-circuited by an open circuit.
    pub rejected_calls: u64,
    /// Times the circuit opened.
    pub times_opened: u64,
    /// Times the circuit closed from half-open.
    pub times_closed: u64,
}

impl BreakerMetrics {
    /// Records a successful call.
    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.successful_calls += 1;
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.total_calls += 1;
        self.failed_calls += 1;
    }

    /// Records a rejected call.
    pub fn record_rejected(&mut self) {
        self.total_calls += 1;
        self.rejected_calls += 1;
    }

    /// Returns the failure rate (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failed_calls as f64 / self.total_calls as f64
    }
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: StateKind,
    /// Consecutive failures while closed.
    pub failure_count: u32,
    /// Consecutive successes while half-open.
    pub success_count: u32,
    /// Wall-clock time of the most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Lifetime counters.
    pub metrics: BreakerMetrics,
}
