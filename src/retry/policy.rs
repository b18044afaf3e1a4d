//! Retry policy configuration.

use std::time::Duration;

/// HTTP statuses that are always worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Upper bound for the backoff multiplier.
const MAX_MULTIPLIER: f64 = 10.0;

/// Bounded exponential backoff policy.
///
/// # Examples
///
/// ```rust
/// use nutriscan::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(3)
///     .with_initial_delay(Duration::from_millis(1000));
///
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub multiplier: f64,

    /// Whether to spread delays to avoid synchronized retries.
    pub jitter: bool,

    /// Case-insensitive substrings of an error message that mark it retryable.
    pub retryable_signatures: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
            retryable_signatures: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Policy for the remote classifier.
    pub fn classifier() -> Self {
        Self::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(500))
            .with_signatures(["timed out", "connection"])
    }

    /// Policy for the generative analyzer.
    pub fn analyzer() -> Self {
        Self::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(1000))
            .with_signatures(["timed out"])
    }

    /// Policy for the persistence write.
    pub fn persistence() -> Self {
        Self::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(500))
            .with_signatures(["timed out", "unavailable"])
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier, clamped to `1.0..=10.0`.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.clamp(1.0, MAX_MULTIPLIER)
        } else {
            1.0
        };
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the retryable message signatures.
    pub fn with_signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_signatures = signatures
            .into_iter()
            .map(|s| s.into().to_lowercase())
            .collect();
        self
    }

    /// Delay after `failures` failed attempts.
    ///
    /// Zero failures means no delay; after the first failure the delay is
    /// `initial_delay`, then grows by `multiplier` up to `max_delay`.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let delay = if self.jitter {
            let factor = 0.5 + (f64::from(failures) * 0.618_033_988_749_895) % 0.5;
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(delay as u64)
    }

    /// Returns whether another attempt may follow `attempts` made so far.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Returns whether an error with this status and message may be retried.
    pub fn is_retryable(&self, status: Option<u16>, message: &str) -> bool {
        if status.is_some_and(|code| RETRYABLE_STATUSES.contains(&code)) {
            return true;
        }
        if self.retryable_signatures.is_empty() {
            return false;
        }
        let message = message.to_lowercase();
        self.retryable_signatures
            .iter()
            .any(|signature| message.contains(signature.as_str()))
    }
}
