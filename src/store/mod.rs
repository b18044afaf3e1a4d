//! Collaborators the pipeline writes to and reads from.
//!
//! These traits describe the surface the orchestrator needs from a scan
//! table, an object store for label photos, an event bus and the user
//! profile service. Production adapters live outside this crate; the
//! [`memory`] module provides process-local implementations with failure
//! injection for tests and demos.

pub mod memory;

pub use memory::{InMemoryEventBus, InMemoryImageStore, InMemoryScanRepository, StaticUserDirectory};

use crate::core::{
    ImageFormat, NewScanRecord, ScanCreatedEvent, ScanId, ScanRecord, ScanSummary, StoreError,
};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Durable storage for scan records.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use nutriscan::store::ScanRepository;
/// use nutriscan::core::{NewScanRecord, ScanRecord, StoreError};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct PgScans { pool: sqlx::PgPool }
///
/// #[async_trait]
/// impl ScanRepository for PgScans {
///     async fn create(&self, draft: NewScanRecord) -> Result<ScanRecord, StoreError> {
///         // INSERT ... RETURNING *
///         todo!()
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait ScanRepository: Send + Sync + Debug {
    /// Persists a new record, assigning its id and timestamps.
    async fn create(&self, draft: NewScanRecord) -> Result<ScanRecord, StoreError>;

    /// Fetches one record.
    async fn find_by_id(&self, id: &ScanId) -> Result<Option<ScanRecord>, StoreError>;

    /// Lists a user's records newest first.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ScanSummary>, StoreError>;

    /// Counts a user's records.
    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Deletes one record. Returns `false` if it did not exist.
    async fn delete(&self, id: &ScanId) -> Result<bool, StoreError>;

    /// Checks connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Blob storage for label photos.
#[async_trait]
pub trait ImageStore: Send + Sync + Debug {
    /// Stores `data` under `key` and returns a stable URL for it.
    async fn upload(
        &self,
        key: &str,
        data: Arc<[u8]>,
        format: ImageFormat,
    ) -> Result<String, StoreError>;
}

/// Fire-and-forget event delivery.
#[async_trait]
pub trait EventPublisher: Send + Sync + Debug {
    /// Publishes `event` on `topic`.
    async fn publish(&self, topic: &str, event: ScanCreatedEvent) -> Result<(), StoreError>;
}

/// Access to user profile data.
#[async_trait]
pub trait UserDirectory: Send + Sync + Debug {
    /// Returns the allergy labels declared by a user.
    async fn allergies(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Object key for a user's label photo.
pub fn image_key(user_id: &str, digest: &str, format: ImageFormat) -> String {
    format!("scans/{}/{}.{}", user_id, digest, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_key_layout() {
        assert_eq!(
            image_key("user-1", "abc123", ImageFormat::Png),
            "scans/user-1/abc123.png"
        );
    }
}
