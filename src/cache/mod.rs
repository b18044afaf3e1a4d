//! Content-addressed result cache.
//!
//! [`ContentCache`] namespaces entries by what was computed from an image:
//!
//! - `scan:{user_id}:{digest}` holds the finished [`ScanRecord`] for one user,
//!   so a client retrying after a lost response gets the same record back.
//! - `enrichment:{digest}` holds the user-independent OCR, classification and
//!   analysis bundle, so the same photo from another user costs no remote calls.
//!
//! Cache failures never fail a scan; they are logged and read as a miss.

mod memory;

pub use memory::InMemoryCache;

use crate::core::{
    ClassificationResult, ContentDigest, ExtractedText, ScanRecord, SemanticAnalysis,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a key-value cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A string key-value store with per-entry expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync + Debug {
    /// Returns the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// The namespace of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// A per-user finished record.
    Scan,
    /// A user-independent enrichment bundle.
    Enrichment,
}

impl CacheKind {
    /// Returns the key prefix and log name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Enrichment => "enrichment",
        }
    }
}

/// Everything computed from an image that does not depend on the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentBundle {
    /// OCR output.
    pub extracted: ExtractedText,
    /// Processing-level classification.
    pub classification: ClassificationResult,
    /// Semantic analysis.
    pub analysis: SemanticAnalysis,
}

impl EnrichmentBundle {
    /// Returns `true` if no stage of the bundle came from a fallback.
    pub fn is_fully_remote(&self) -> bool {
        !self.classification.is_degraded() && !self.analysis.is_fallback
    }
}

/// Typed, namespaced access to a [`KeyValueCache`].
#[derive(Debug, Clone)]
pub struct ContentCache {
    store: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl ContentCache {
    /// Creates a cache over `store` with entry lifetime `ttl`.
    pub fn new(store: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key of a user's finished record for an image.
    pub fn scan_key(user_id: &str, digest: &ContentDigest) -> String {
        format!("{}:{}:{}", CacheKind::Scan.name(), user_id, digest)
    }

    /// Key of the enrichment bundle for an image.
    pub fn enrichment_key(digest: &ContentDigest) -> String {
        format!("{}:{}", CacheKind::Enrichment.name(), digest)
    }

    /// Looks up a user's finished record.
    pub async fn get_scan(&self, user_id: &str, digest: &ContentDigest) -> Option<ScanRecord> {
        self.get_json(CacheKind::Scan, &Self::scan_key(user_id, digest))
            .await
    }

    /// Stores a user's finished record.
    pub async fn put_scan(&self, user_id: &str, digest: &ContentDigest, record: &ScanRecord) {
        self.put_json(CacheKind::Scan, &Self::scan_key(user_id, digest), record)
            .await;
    }

    /// Drops a user's finished record.
    pub async fn evict_scan(&self, user_id: &str, digest: &ContentDigest) {
        let key = Self::scan_key(user_id, digest);
        if let Err(err) = self.store.delete(&key).await {
            tracing::warn!(key = %key, error = %err, "cache delete failed");
        }
    }

    /// Looks up the enrichment bundle for an image.
    pub async fn get_enrichment(&self, digest: &ContentDigest) -> Option<EnrichmentBundle> {
        self.get_json(CacheKind::Enrichment, &Self::enrichment_key(digest))
            .await
    }

    /// Stores the enrichment bundle for an image.
    ///
    /// Bundles containing fallback output are not stored, so a later scan
    /// gets another chance at the remote services.
    pub async fn put_enrichment(&self, digest: &ContentDigest, bundle: &EnrichmentBundle) -> bool {
        if !bundle.is_fully_remote() {
            tracing::debug!(digest = %digest.short(), "degraded enrichment not cached");
            return false;
        }
        self.put_json(CacheKind::Enrichment, &Self::enrichment_key(digest), bundle)
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, kind: CacheKind, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(cache_kind = kind.name(), error = %err, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(cache_kind = kind.name(), error = %err, "discarding undecodable cache entry");
                if let Err(err) = self.store.delete(key).await {
                    tracing::debug!(error = %err, "cache delete failed");
                }
                None
            }
        }
    }

    async fn put_json<T: Serialize>(&self, kind: CacheKind, key: &str, value: &T) -> bool {
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.store.set(key, raw, self.ttl).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(cache_kind = kind.name(), error = %err, "cache write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContentHasher, NewScanRecord, ProcessingGroup, Provenance};
    use crate::gateway::{fallback_analysis, fallback_classification};

    fn record() -> ScanRecord {
        ScanRecord::from_new(NewScanRecord {
            user_id: "user-1".to_string(),
            product_name: "Oat Biscuits".to_string(),
            raw_text: "oats, sugar, butter".to_string(),
            processing_group: ProcessingGroup::Processed,
            nutri_grade: None,
            allergens: vec!["Dairy".to_string()],
            additives: Vec::new(),
            clean_recipe: "Bake oats.".to_string(),
            functional_categories: Vec::new(),
            estimated_shelf_life: "Unknown".to_string(),
            ocr_confidence: 0.91,
            classification_confidence: 0.8,
            is_safe: true,
            allergen_alert: None,
            image_url: None,
        })
    }

    fn bundle(remote: bool) -> EnrichmentBundle {
        let text = "oats, sugar, butter";
        let classification = fallback_classification(text);
        let mut analysis = fallback_analysis(text, classification.group);
        let classification = if remote {
            analysis.is_fallback = false;
            ClassificationResult {
                provenance: Provenance::Remote,
                ..classification
            }
        } else {
            classification
        };
        EnrichmentBundle {
            extracted: ExtractedText {
                text: text.to_string(),
                confidence: 0.9,
            },
            classification,
            analysis,
        }
    }

    fn cache() -> ContentCache {
        ContentCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(3600))
    }

    #[test]
    fn test_keys_are_namespaced() {
        let digest = ContentHasher::new().digest(b"img");
        assert_eq!(ContentCache::scan_key("u", &digest), format!("scan:u:{digest}"));
        assert_eq!(ContentCache::enrichment_key(&digest), format!("enrichment:{digest}"));
    }

    #[tokio::test]
    async fn test_scan_is_per_user() {
        let cache = cache();
        let digest = ContentHasher::new().digest(b"img");
        let record = record();

        cache.put_scan("user-1", &digest, &record).await;
        assert_eq!(cache.get_scan("user-1", &digest).await, Some(record));
        assert_eq!(cache.get_scan("user-2", &digest).await, None);

        cache.evict_scan("user-1", &digest).await;
        assert_eq!(cache.get_scan("user-1", &digest).await, None);
    }

    #[tokio::test]
    async fn test_degraded_bundle_not_stored() {
        let cache = cache();
        let digest = ContentHasher::new().digest(b"img");

        assert!(!cache.put_enrichment(&digest, &bundle(false)).await);
        assert!(cache.get_enrichment(&digest).await.is_none());

        assert!(cache.put_enrichment(&digest, &bundle(true)).await);
        assert_eq!(cache.get_enrichment(&digest).await, Some(bundle(true)));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ContentCache::new(Arc::new(InMemoryCache::new()), Duration::from_millis(50));
        let digest = ContentHasher::new().digest(b"img");
        cache.put_scan("u", &digest, &record()).await;
        assert!(cache.get_scan("u", &digest).await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get_scan("u", &digest).await, None);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(InMemoryCache::new());
        let cache = ContentCache::new(store.clone(), Duration::from_secs(60));
        let digest = ContentHasher::new().digest(b"img");
        let key = ContentCache::scan_key("u", &digest);

        store
            .set(&key, "{broken".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_scan("u", &digest).await, None);
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_store_reads_as_miss() {
        let store = Arc::new(InMemoryCache::new());
        store.set_available(false);
        let cache = ContentCache::new(store, Duration::from_secs(60));
        let digest = ContentHasher::new().digest(b"img");

        cache.put_scan("u", &digest, &record()).await;
        assert_eq!(cache.get_scan("u", &digest).await, None);
    }
}
