//! Process-local collaborators with failure injection.

use crate::core::{
    ImageFormat, NewScanRecord, ScanCreatedEvent, ScanId, ScanRecord, ScanSummary, StoreError,
};
use crate::store::{EventPublisher, ImageStore, ScanRepository, UserDirectory};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// In-memory scan table.
///
/// Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScanRepository {
    rows: Arc<RwLock<Vec<ScanRecord>>>,
    fail_next_creates: Arc<AtomicU32>,
    create_calls: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryScanRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `create` fail with `Unavailable`.
    pub fn fail_next_creates(&self, count: u32) {
        self.fail_next_creates.store(count, Ordering::SeqCst);
    }

    /// Makes every call fail (`true`) or succeed.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of `create` calls, failed ones included.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of stored rows.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ScanRecord>> {
        self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ScanRecord>> {
        self.rows.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("scan repository", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ScanRepository for InMemoryScanRepository {
    async fn create(&self, draft: NewScanRecord) -> Result<ScanRecord, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let injected = self
            .fail_next_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::unavailable("scan repository", "injected failure"));
        }

        let record = ScanRecord::from_new(draft);
        self.write().push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &ScanId) -> Result<Option<ScanRecord>, StoreError> {
        self.check_available()?;
        Ok(self.read().iter().find(|row| &row.id == id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ScanSummary>, StoreError> {
        self.check_available()?;
        let rows = self.read();
        let mut owned: Vec<&ScanRecord> = rows.iter().filter(|row| row.user_id == user_id).collect();
        // Rows are appended in creation order; reverse first so equal
        // timestamps keep newest-first.
        owned.reverse();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(owned
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(ScanRecord::summary)
            .collect())
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.read().iter().filter(|row| row.user_id == user_id).count() as u64)
    }

    async fn delete(&self, id: &ScanId) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.write();
        let before = rows.len();
        rows.retain(|row| &row.id != id);
        Ok(rows.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

/// In-memory object store returning `{base_url}/{key}` URLs.
#[derive(Debug, Clone)]
pub struct InMemoryImageStore {
    base_url: String,
    objects: Arc<RwLock<HashMap<String, usize>>>,
    failing: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl InMemoryImageStore {
    /// Creates a store serving URLs under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
            latency: None,
        }
    }

    /// Sets the simulated upload latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every upload fail (`true`) or succeed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the size of the object at `key`, if stored.
    pub fn object_size(&self, key: &str) -> Option<usize> {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
    }

    /// Returns the number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for InMemoryImageStore {
    fn default() -> Self {
        Self::new("memory://images")
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn upload(
        &self,
        key: &str,
        data: Arc<[u8]>,
        _format: ImageFormat,
    ) -> Result<String, StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("image store", "bucket unreachable"));
        }
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), data.len());
        Ok(format!("{}/{}", self.base_url, key))
    }
}

/// In-memory event bus that records published events.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    events: Arc<Mutex<Vec<(String, ScanCreatedEvent)>>>,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
}

impl InMemoryEventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail (`true`) or succeed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the successfully published events.
    pub fn published(&self) -> Vec<(String, ScanCreatedEvent)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the number of publish attempts, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, topic: &str, event: ScanCreatedEvent) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("event bus", "broker unreachable"));
        }
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((topic.to_string(), event));
        Ok(())
    }
}

/// A fixed map of user allergies.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    allergies: HashMap<String, Vec<String>>,
    failing: bool,
}

impl StaticUserDirectory {
    /// Creates a directory where nobody has allergies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares allergies for a user.
    pub fn with_allergies<I, S>(mut self, user_id: impl Into<String>, allergies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allergies
            .insert(user_id.into(), allergies.into_iter().map(Into::into).collect());
        self
    }

    /// Makes every lookup fail.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn allergies(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        if self.failing {
            return Err(StoreError::unavailable("user directory", "profile service down"));
        }
        Ok(self.allergies.get(user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProcessingGroup;

    fn draft(user_id: &str, name: &str) -> NewScanRecord {
        NewScanRecord {
            user_id: user_id.to_string(),
            product_name: name.to_string(),
            raw_text: "water".to_string(),
            processing_group: ProcessingGroup::Unprocessed,
            nutri_grade: None,
            allergens: Vec::new(),
            additives: Vec::new(),
            clean_recipe: String::new(),
            functional_categories: Vec::new(),
            estimated_shelf_life: "Unknown".to_string(),
            ocr_confidence: 1.0,
            classification_confidence: 1.0,
            is_safe: true,
            allergen_alert: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let repo = InMemoryScanRepository::new();
        for name in ["a", "b", "c"] {
            repo.create(draft("u1", name)).await.unwrap();
        }
        repo.create(draft("u2", "other")).await.unwrap();

        let page = repo.list_for_user("u1", 2, 0).await.unwrap();
        let names: Vec<_> = page.iter().map(|s| s.product_name.as_str()).collect();
        assert_eq!(names, ["c", "b"]);

        let rest = repo.list_for_user("u1", 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].product_name, "a");
        assert_eq!(repo.count_for_user("u1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_injected_create_failures() {
        let repo = InMemoryScanRepository::new();
        repo.fail_next_creates(2);

        assert!(repo.create(draft("u", "x")).await.is_err());
        assert!(repo.create(draft("u", "x")).await.is_err());
        assert!(repo.create(draft("u", "x")).await.is_ok());
        assert_eq!(repo.create_calls(), 3);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let repo = InMemoryScanRepository::new();
        let record = repo.create(draft("u", "x")).await.unwrap();
        assert!(repo.delete(&record.id).await.unwrap());
        assert!(!repo.delete(&record.id).await.unwrap());
        assert!(repo.find_by_id(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_image_store_urls() {
        let store = InMemoryImageStore::new("https://cdn.example/");
        let url = store
            .upload("scans/u/abc.png", Arc::from(&b"png"[..]), ImageFormat::Png)
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/scans/u/abc.png");
        assert_eq!(store.object_size("scans/u/abc.png"), Some(3));

        store.set_failing(true);
        assert!(store
            .upload("k", Arc::from(&b"x"[..]), ImageFormat::Png)
            .await
            .is_err());
    }
}
