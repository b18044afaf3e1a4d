//! Circuit breaker configuration.

use std::time::Duration;

/// Thresholds and cooldown for one circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// How long the circuit stays open before probing.
    pub open_duration: Duration,

    /// Concurrent probe calls allowed while half-open.
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(60),
            half_open_max_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tuning for the remote classifier: opens late, recovers fast.
    pub fn classifier() -> Self {
        Self::default()
    }

    /// Tuning for the generative analyzer: opens early, recovers slowly.
    pub fn analyzer() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            open_duration: Duration::from_secs(120),
            half_open_max_probes: 1,
        }
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Sets the open duration.
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Sets the maximum number of concurrent half-open probes.
    pub fn with_half_open_max_probes(mut self, max: u32) -> Self {
        self.half_open_max_probes = max.max(1);
        self
    }
}
