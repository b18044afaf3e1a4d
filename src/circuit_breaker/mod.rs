//! Circuit breakers guarding remote dependencies.
//!
//! A breaker stops traffic to a failing dependency for a cooldown period and
//! then probes it to detect recovery. One long-lived breaker exists per
//! dependency name; a process restart resets every breaker to closed.
//!
//! ## States
//!
//! - **Closed**: normal operation; consecutive failures are counted.
//! - **Open**: calls are short-circuited (or answered by a fallback).
//! - **Half-Open**: probes decide whether to close or reopen.
//!
//! ## Usage
//!
//! ```rust
//! use nutriscan::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_open_duration(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new("classifier", config);
//! assert!(breaker.state().is_closed());
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::{BreakerError, CircuitBreaker};
pub use config::CircuitBreakerConfig;
pub use state::{BreakerMetrics, BreakerSnapshot, BreakerState, StateKind};
