//! Generative semantic analysis with a keyword-driven fallback.

use crate::backends::ArcAnalyzer;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::core::{ClassificationResult, DependencyError, ProcessingGroup, SemanticAnalysis};
use crate::gateway::fallback::fallback_analysis;
use crate::gateway::response::parse_analysis;
use crate::retry::{with_retry, RetryPolicy};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Name of the analyzer dependency in logs and health reports.
pub const ANALYZER_DEPENDENCY: &str = "analyzer";

/// Configuration for the analyzer gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Timeout for one generation call.
    pub timeout: Duration,
    /// Retry policy around the generation call.
    pub retry: RetryPolicy,
    /// Breaker tuning.
    pub breaker: CircuitBreakerConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::analyzer(),
            breaker: CircuitBreakerConfig::analyzer(),
        }
    }
}

impl AnalyzerConfig {
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
}

/// Builds the generation prompt for `text` at processing level `group`.
pub fn build_prompt(text: &str, group: ProcessingGroup) -> String {
    format!(
        "You are a senior food technologist. Be precise and conservative when \
rating risk.\n\n\
Ingredient list: \"{text}\"\n\
Processing level: {level} ({description})\n\n\
Tasks:\n\
1. productName: the most likely product name for these ingredients.\n\
2. additives: for each non-essential additive give name, function, risk \
(exactly one of Low, Medium, High, Unknown) and a short explanation.\n\
3. cleanRecipe: a practical home-kitchen alternative or substitution.\n\
4. functionalCategories: every functional category present, \
e.g. [\"Emulsifiers\", \"Sweeteners\"].\n\
5. nutriScore: one letter A to E estimated from ingredient order.\n\
6. estimatedShelfLife: a short duration such as \"6 months\".\n\n\
Answer with one JSON object containing exactly these keys and no markdown.",
        level = group.level(),
        description = group.description(),
    )
}

/// Produces a [`SemanticAnalysis`] from a generative backend.
///
/// Unusable responses count as failures of the call, so a backend that
/// keeps answering garbage trips the breaker the same way an unreachable
/// one does.
pub struct AnalyzerGateway {
    backend: Option<ArcAnalyzer>,
    breaker: Arc<CircuitBreaker>,
    config: AnalyzerConfig,
}

impl AnalyzerGateway {
    /// Creates a gateway with its own breaker.
    pub fn new(backend: Option<ArcAnalyzer>, config: AnalyzerConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            ANALYZER_DEPENDENCY,
            config.breaker.clone(),
        ));
        Self::with_breaker(backend, breaker, config)
    }

    /// Creates a gateway around an existing breaker.
    pub fn with_breaker(
        backend: Option<ArcAnalyzer>,
        breaker: Arc<CircuitBreaker>,
        config: AnalyzerConfig,
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
        backend: &ArcAnalyzer,
        prompt: &str,
    ) -> Result<SemanticAnalysis, DependencyError> {
        let text = tokio::time::timeout(self.config.timeout, backend.generate(prompt))
            .await
            .map_err(|_| DependencyError::timeout(backend.name(), self.config.timeout))??;
        parse_analysis(&text)
            .map_err(|err| DependencyError::invalid_response(backend.name(), err.to_string()))
    }

    /// Analyzes ingredient text given its classification.
    pub async fn analyze(&self, text: &str, classification: &ClassificationResult) -> SemanticAnalysis {
        let group = classification.group;
        let Some(backend) = &self.backend else {
            tracing::debug!("analyzer not configured, using keyword analysis");
            return fallback_analysis(text, group);
        };

        let prompt = build_prompt(text, group);
        let prompt = prompt.as_str();

        let outcome = self
            .breaker
            .call_or_else(
                move || async move {
                    with_retry(&self.config.retry, "analyze", move || {
                        self.attempt(backend, prompt)
                    })
                    .await
                },
                move || {
                    tracing::warn!(dependency = ANALYZER_DEPENDENCY, "circuit open, using keyword analysis");
                    fallback_analysis(text, group)
                },
            )
            .await;

        outcome.unwrap_or_else(|err| {
            tracing::warn!(
                dependency = ANALYZER_DEPENDENCY,
                attempts = err.attempts(),
                error = %err.inner(),
                "analyzer failed, using keyword analysis"
            );
            fallback_analysis(text, group)
        })
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

impl fmt::Debug for AnalyzerGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerGateway")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("breaker", &self.breaker)
            .field("config", &self.config)
            .finish()
    }
}
