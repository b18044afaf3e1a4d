//! Orchestrator configuration.

use crate::retry::RetryPolicy;

use std::time::Duration;

/// Configuration for the scan orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Largest accepted image.
    pub max_image_bytes: usize,
    /// Lifetime of cache entries.
    pub cache_ttl: Duration,
    /// Budget shared by classification and analysis, counted from the end of OCR.
    pub enrichment_deadline: Duration,
    /// Retry policy for the repository write.
    pub persistence_retry: RetryPolicy,
    /// Default page size for history listings.
    pub default_page_size: u64,
    /// Largest accepted page size.
    pub max_page_size: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024, // 10 MiB
            cache_ttl: Duration::from_secs(3600),
            enrichment_deadline: Duration::from_secs(45),
            persistence_retry: RetryPolicy::persistence(),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest accepted image.
    pub fn with_max_image_bytes(mut self, bytes: usize) -> Self {
        self.max_image_bytes = bytes;
        self
    }

    /// Sets the cache entry lifetime.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the enrichment deadline.
    pub fn with_enrichment_deadline(mut self, deadline: Duration) -> Self {
        self.enrichment_deadline = deadline;
        self
    }

    /// Sets the persistence retry policy.
    pub fn with_persistence_retry(mut self, policy: RetryPolicy) -> Self {
        self.persistence_retry = policy;
        self
    }

    /// Sets the history page sizes.
    pub fn with_page_sizes(mut self, default: u64, max: u64) -> Self {
        self.max_page_size = max.max(1);
        self.default_page_size = default.clamp(1, self.max_page_size);
        self
    }

    /// Resolves a requested page size against the configured bounds.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        match requested {
            Some(0) | None => self.default_page_size,
            Some(limit) => limit.min(self.max_page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_image_bytes, 10_485_760);
        assert_eq!(config.enrichment_deadline, Duration::from_secs(45));
        assert_eq!(config.persistence_retry.max_attempts, 3);
    }

    #[test]
    fn test_page_size_bounds() {
        let config = OrchestratorConfig::default().with_page_sizes(10, 50);
        assert_eq!(config.page_size(None), 10);
        assert_eq!(config.page_size(Some(0)), 10);
        assert_eq!(config.page_size(Some(500)), 50);
        assert_eq!(config.page_size(Some(7)), 7);
    }
}
