//! Processing-level classification with rule-based fallback.

use crate::backends::{ArcClassifier, RemoteClassification};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::core::{round2, ClassificationResult, DependencyError, ProcessingGroup, Provenance};
use crate::gateway::fallback::{fallback_classification, fallback_group};
use crate::retry::{with_retry, RetryPolicy};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Name of the classifier dependency in logs and health reports.
pub const CLASSIFIER_DEPENDENCY: &str = "classifier";

/// Configuration for the classifier gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Timeout for one remote call.
    pub timeout: Duration,
    /// Retry policy around the remote call.
    pub retry: RetryPolicy,
    /// Breaker tuning.
    pub breaker: CircuitBreakerConfig,
    /// Remote confidence below this replaces the group with the rule-based one.
    pub hybrid_threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::classifier(),
            breaker: CircuitBreakerConfig::classifier(),
            hybrid_threshold: 0.5,
        }
    }
}

impl ClassifierConfig {
    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the breaker tuning.
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the hybrid threshold.
    pub fn with_hybrid_threshold(mut self, threshold: f32) -> Self {
        self.hybrid_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

/// Checks a remote response against the value ranges.
pub fn validate_remote(
    dependency: &str,
    remote: RemoteClassification,
) -> Result<ClassificationResult, DependencyError> {
    let group = ProcessingGroup::from_level(remote.group).ok_or_else(|| {
        DependencyError::invalid_response(
            dependency,
            format!("group {} outside 1..=4", remote.group),
        )
    })?;

    if !remote.confidence.is_finite() || !(0.0..=1.0).contains(&remote.confidence) {
        return Err(DependencyError::invalid_response(
            dependency,
            format!("confidence {} outside [0, 1]", remote.confidence),
        ));
    }

    Ok(ClassificationResult {
        group,
        confidence: remote.confidence as f32,
        contributing_ingredients: remote.contributing_ingredients,
        allergens: remote.allergens,
        reasons: remote.reasons,
        provenance: Provenance::Remote,
    })
}

/// Applies the hybrid rule to a validated remote result.
///
/// The confidence is compared at the two-decimal precision it is stored
/// with, so a stored 0.5 is never a hybrid result under a 0.5 threshold.
/// Below `threshold` only the group is replaced by the rule-based group;
/// confidence, allergens, ingredients and reasons stay as the remote sent
/// them.
pub fn apply_hybrid_rule(
    result: ClassificationResult,
    text: &str,
    threshold: f32,
) -> ClassificationResult {
    if round2(result.confidence) >= threshold {
        return result;
    }
    ClassificationResult {
        group: fallback_group(text),
        provenance: Provenance::Hybrid,
        ..result
    }
}

/// Classifies ingredient text remotely, degrading to local rules.
///
/// Never returns an error: when the backend is missing, unreachable,
/// short-circuited or answers out of range, the rule-based result is used.
pub struct ClassifierGateway {
    backend: Option<ArcClassifier>,
    breaker: Arc<CircuitBreaker>,
    config: ClassifierConfig,
}

impl ClassifierGateway {
    /// Creates a gateway with its own breaker.
    pub fn new(backend: Option<ArcClassifier>, config: ClassifierConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            CLASSIFIER_DEPENDENCY,
            config.breaker.clone(),
        ));
        Self::with_breaker(backend, breaker, config)
    }

    /// Creates a gateway around an existing breaker.
    pub fn with_breaker(
        backend: Option<ArcClassifier>,
        breaker: Arc<CircuitBreaker>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            backend,
            breaker,
            config,
        }
    }

    /// Returns the breaker guarding the backend.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Returns `true` if a remote backend is configured.
    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    async fn attempt(
        &self,
        backend: &ArcClassifier,
        text: &str,
    ) -> Result<ClassificationResult, DependencyError> {
        let remote = tokio::time::timeout(self.config.timeout, backend.classify(text))
            .await
            .map_err(|_| DependencyError::timeout(backend.name(), self.config.timeout))??;
        validate_remote(backend.name(), remote)
    }

    /// Classifies normalized ingredient text.
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        let Some(backend) = &self.backend else {
            tracing::debug!("classifier not configured, using rules");
            return fallback_classification(text);
        };

        let outcome = self
            .breaker
            .call_or_else(
                move || async move {
                    with_retry(&self.config.retry, "classify", move || {
                        self.attempt(backend, text)
                    })
                    .await
                    .map(|result| apply_hybrid_rule(result, text, self.config.hybrid_threshold))
                },
                move || {
                    tracing::warn!(dependency = CLASSIFIER_DEPENDENCY, "circuit open, using rules");
                    fallback_classification(text)
                },
            )
            .await;

        match outcome {
            Ok(result) => {
                if result.provenance == Provenance::Hybrid {
                    tracing::warn!(
                        dependency = CLASSIFIER_DEPENDENCY,
                        confidence = result.confidence,
                        group = result.group.level(),
                        "low remote confidence, group replaced by rules"
                    );
                }
                result
            }
            Err(err) => {
                tracing::warn!(
                    dependency = CLASSIFIER_DEPENDENCY,
                    attempts = err.attempts(),
                    error = %err.inner(),
                    "classifier failed, using rules"
                );
                fallback_classification(text)
            }
        }
    }

    /// Checks the backend, or `None` if no backend is configured.
    pub async fn health_check(&self) -> Option<Result<(), DependencyError>> {
        let backend = self.backend.as_ref()?;
        let check = tokio::time::timeout(self.config.timeout, backend.health_check()).await;
        Some(check.unwrap_or_else(|_| {
            Err(DependencyError::timeout(backend.name(), self.config.timeout))
        }))
    }
}

impl fmt::Debug for ClassifierGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierGateway")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("breaker", &self.breaker)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockClassifier;
    use crate::gateway::fallback::FALLBACK_CONFIDENCE;

    const TEXT: &str = "maltodextrin, hydrogenated oil, high fructose corn syrup, red 40";

    fn gateway(mock: &MockClassifier) -> ClassifierGateway {
        ClassifierGateway::new(Some(Arc::new(mock.clone())), ClassifierConfig::default())
    }

    #[tokio::test]
    async fn test_remote_result_used() {
        let mock = MockClassifier::new()
            .with_response(RemoteClassification::new(2, 0.88).with_allergens(["Soy"]));
        let result = gateway(&mock).classify(TEXT).await;

        assert_eq!(result.provenance, Provenance::Remote);
        assert_eq!(result.group, ProcessingGroup::CulinaryIngredient);
        assert_eq!(result.detected_allergens(), ["Soy".to_string()]);
    }

    #[tokio::test]
    async fn test_hybrid_replaces_only_group() {
        let mock = MockClassifier::new().with_response(
            RemoteClassification::new(1, 0.49)
                .with_allergens(["Peanut"])
                .with_reasons(["model reason"]),
        );
        let result = gateway(&mock).classify(TEXT).await;

        assert_eq!(result.provenance, Provenance::Hybrid);
        assert_eq!(result.group, ProcessingGroup::UltraProcessed);
        assert!((result.confidence - 0.49).abs() < 1e-6);
        assert_eq!(result.allergens, Some(vec!["Peanut".to_string()]));
        assert_eq!(result.reasons, Some(vec!["model reason".to_string()]));
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let mock = MockClassifier::new().with_response(RemoteClassification::new(1, 0.5));
        let result = gateway(&mock).classify(TEXT).await;
        assert_eq!(result.provenance, Provenance::Remote);
        assert_eq!(result.group, ProcessingGroup::Unprocessed);
    }

    #[tokio::test]
    async fn test_threshold_compares_stored_precision() {
        let mock = MockClassifier::new().with_response(RemoteClassification::new(1, 0.499));
        let result = gateway(&mock).classify(TEXT).await;
        assert_eq!(result.provenance, Provenance::Remote);
        assert_eq!(result.group, ProcessingGroup::Unprocessed);

        let mock = MockClassifier::new().with_response(RemoteClassification::new(1, 0.494));
        let result = gateway(&mock).classify(TEXT).await;
        assert_eq!(result.provenance, Provenance::Hybrid);
        assert_eq!(result.group, ProcessingGroup::UltraProcessed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_falls_back_without_retry() {
        let mock = MockClassifier::new().with_response(RemoteClassification::new(7, 0.9));
        let gateway = gateway(&mock);
        let result = gateway.classify(TEXT).await;

        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(gateway.breaker().metrics().failed_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let mock = MockClassifier::new()
            .with_failures([DependencyError::status("mock-classifier", 503, "busy")])
            .with_response(RemoteClassification::new(4, 0.95));
        let result = gateway(&mock).classify(TEXT).await;

        assert_eq!(result.provenance, Provenance::Remote);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let mock = MockClassifier::new().with_latency(Duration::from_secs(60));
        let gateway = ClassifierGateway::new(
            Some(Arc::new(mock.clone())),
            ClassifierConfig::default().with_retry(RetryPolicy::no_retry()),
        );
        let result = gateway.classify(TEXT).await;

        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(gateway.breaker().state().failure_count(), Some(1));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_backend() {
        let mock = MockClassifier::new();
        let gateway = gateway(&mock);
        gateway.breaker().force_open();

        let result = gateway.classify(TEXT).await;
        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_uses_rules() {
        let gateway = ClassifierGateway::new(None, ClassifierConfig::default());
        let result = gateway.classify("water, salt, sugar, flour").await;
        assert_eq!(result.group, ProcessingGroup::Unprocessed);
        assert!(gateway.health_check().await.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_confidence() {
        assert!(validate_remote("c", RemoteClassification::new(2, f64::NAN)).is_err());
        assert!(validate_remote("c", RemoteClassification::new(2, -0.1)).is_err());
        assert!(validate_remote("c", RemoteClassification::new(0, 0.5)).is_err());
        assert!(validate_remote("c", RemoteClassification::new(4, 1.0)).is_ok());
    }
}
