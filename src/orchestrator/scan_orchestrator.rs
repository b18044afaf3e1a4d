//! The scan pipeline.

use crate::audit::{self, DegradedStage, ScanAuditEvent};
use crate::backends::{AnalyzerBackend, ArcAnalyzer, ArcClassifier, ClassifierBackend};
use crate::cache::{CacheKind, ContentCache, EnrichmentBundle, InMemoryCache, KeyValueCache};
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::core::{
    validate_image, ContentDigest, ContentHasher, DependencyError, ImageFormat, ScanCreatedEvent,
    ScanError, ScanId, ScanPage, ScanRecord, ScanRequest, ScanResult, StoreError,
};
use crate::gateway::{
    fallback_analysis, fallback_classification, AnalyzerConfig, AnalyzerGateway,
    ClassifierConfig, ClassifierGateway, ANALYZER_DEPENDENCY, CLASSIFIER_DEPENDENCY,
};
use crate::ocr::TextExtractor;
use crate::orchestrator::allergen::check_allergens;
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::health::{check_service, ServiceHealth};
use crate::orchestrator::sanitize::{build_record, RecordParts};
use crate::retry::with_retry;
use crate::store::{image_key, EventPublisher, ImageStore, ScanRepository, UserDirectory};

use futures::future::{join_all, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

/// Name of the repository dependency in health reports.
pub const REPOSITORY_DEPENDENCY: &str = "repository";

/// Stages a submission passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScanStage {
    /// The request arrived.
    Received,
    /// Image and user id were accepted.
    Validated,
    /// The per-user cache missed.
    CacheChecked,
    /// OCR produced usable text.
    TextExtracted,
    /// A processing group was assigned.
    Classified,
    /// Semantic analysis is available.
    Analyzed,
    /// The user's allergies were checked.
    AllergenChecked,
    /// The record was written.
    Persisted,
    /// The creation event was handed off.
    EventEmitted,
    /// The record was returned.
    Done,
}

impl ScanStage {
    /// Returns the name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::CacheChecked => "cache_checked",
            Self::TextExtracted => "text_extracted",
            Self::Classified => "classified",
            Self::Analyzed => "analyzed",
            Self::AllergenChecked => "allergen_checked",
            Self::Persisted => "persisted",
            Self::EventEmitted => "event_emitted",
            Self::Done => "done",
        }
    }
}

async fn gateway_health<F>(
    service: &str,
    configured: bool,
    breaker: &CircuitBreaker,
    check: F,
) -> ServiceHealth
where
    F: Future<Output = Option<Result<(), DependencyError>>>,
{
    if !configured {
        return ServiceHealth::not_configured(service);
    }
    check_service(service, Some(breaker), async move { check.await.unwrap_or(Ok(())) }).await
}

fn reached(stage: ScanStage) {
    tracing::debug!(stage = stage.name(), "stage reached");
}

/// An image upload running alongside the pipeline.
///
/// Dropping the task before it is joined aborts the upload.
struct UploadTask {
    handle: Option<JoinHandle<Result<String, StoreError>>>,
}

impl UploadTask {
    async fn join(mut self, correlation_id: &str) -> Option<String> {
        let handle = self.handle.take()?;
        let reason = match handle.await {
            Ok(Ok(url)) => return Some(url),
            Ok(Err(err)) => err.to_string(),
            Err(err) => format!("upload task failed: {err}"),
        };
        tracing::warn!(error = %reason, "image upload failed, storing scan without image");
        audit::emit_scan_degraded(correlation_id, DegradedStage::Upload, &reason);
        None
    }
}

impl Drop for UploadTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Builder for creating a [`ScanOrchestrator`].
pub struct ScanOrchestratorBuilder {
    extractor: Option<Arc<TextExtractor>>,
    classifier: Option<ArcClassifier>,
    analyzer: Option<ArcAnalyzer>,
    classifier_config: ClassifierConfig,
    analyzer_config: AnalyzerConfig,
    repository: Option<Arc<dyn ScanRepository>>,
    image_store: Option<Arc<dyn ImageStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    users: Option<Arc<dyn UserDirectory>>,
    cache_store: Option<Arc<dyn KeyValueCache>>,
    hasher: ContentHasher,
    config: OrchestratorConfig,
}

impl ScanOrchestratorBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            extractor: None,
            classifier: None,
            analyzer: None,
            classifier_config: ClassifierConfig::default(),
            analyzer_config: AnalyzerConfig::default(),
            repository: None,
            image_store: None,
            publisher: None,
            users: None,
            cache_store: None,
            hasher: ContentHasher::new(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Sets the OCR extractor. Required.
    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Sets the remote classifier.
    pub fn with_classifier<C: ClassifierBackend + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Sets the remote classifier wrapped in an Arc.
    pub fn with_arc_classifier(mut self, classifier: ArcClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the generative analyzer.
    pub fn with_analyzer<A: AnalyzerBackend + 'static>(mut self, analyzer: A) -> Self {
        self.analyzer = Some(Arc::new(analyzer));
        self
    }

    /// Sets the generative analyzer wrapped in an Arc.
    pub fn with_arc_analyzer(mut self, analyzer: ArcAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Sets the classifier gateway configuration.
    pub fn with_classifier_config(mut self, config: ClassifierConfig) -> Self {
        self.classifier_config = config;
        self
    }

    /// Sets the analyzer gateway configuration.
    pub fn with_analyzer_config(mut self, config: AnalyzerConfig) -> Self {
        self.analyzer_config = config;
        self
    }

    /// Sets the scan repository. Required.
    pub fn with_repository<R: ScanRepository + 'static>(mut self, repository: R) -> Self {
        self.repository = Some(Arc::new(repository));
        self
    }

    /// Sets the object store for label photos.
    pub fn with_image_store<S: ImageStore + 'static>(mut self, store: S) -> Self {
        self.image_store = Some(Arc::new(store));
        self
    }

    /// Sets the event publisher.
    pub fn with_event_publisher<P: EventPublisher + 'static>(mut self, publisher: P) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    /// Sets the user directory used for allergy lookups.
    pub fn with_user_directory<U: UserDirectory + 'static>(mut self, users: U) -> Self {
        self.users = Some(Arc::new(users));
        self
    }

    /// Sets the key-value store behind the content cache.
    ///
    /// Defaults to a process-local [`InMemoryCache`].
    pub fn with_cache_store(mut self, store: Arc<dyn KeyValueCache>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Sets the content hasher.
    pub fn with_hasher(mut self, hasher: ContentHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator.
    pub fn build(self) -> Result<ScanOrchestrator, ScanError> {
        let extractor = self
            .extractor
            .ok_or_else(|| ScanError::configuration("an OCR extractor is required"))?;
        let repository = self
            .repository
            .ok_or_else(|| ScanError::configuration("a scan repository is required"))?;

        if self.classifier.is_none() {
            tracing::warn!("no classifier configured, all scans use rule-based classification");
        }
        if self.analyzer.is_none() {
            tracing::warn!("no analyzer configured, all scans use keyword analysis");
        }

        let cache_store = self
            .cache_store
            .unwrap_or_else(|| Arc::new(InMemoryCache::new()));

        Ok(ScanOrchestrator {
            extractor,
            classifier: ClassifierGateway::new(self.classifier, self.classifier_config),
            analyzer: AnalyzerGateway::new(self.analyzer, self.analyzer_config),
            repository,
            image_store: self.image_store,
            publisher: self.publisher,
            users: self.users,
            cache: ContentCache::new(cache_store, self.config.cache_ttl),
            hasher: self.hasher,
            config: self.config,
        })
    }
}

impl Default for ScanOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs label photos through OCR, classification, analysis and the
/// allergy check, and persists the result.
///
/// One orchestrator is meant to live for the whole process: its breakers
/// and cache are shared by every request.
pub struct ScanOrchestrator {
    extractor: Arc<TextExtractor>,
    classifier: ClassifierGateway,
    analyzer: AnalyzerGateway,
    repository: Arc<dyn ScanRepository>,
    image_store: Option<Arc<dyn ImageStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    users: Option<Arc<dyn UserDirectory>>,
    cache: ContentCache,
    hasher: ContentHasher,
    config: OrchestratorConfig,
}

impl ScanOrchestrator {
    /// Creates a new builder.
    pub fn builder() -> ScanOrchestratorBuilder {
        ScanOrchestratorBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the classifier gateway.
    pub fn classifier(&self) -> &ClassifierGateway {
        &self.classifier
    }

    /// Returns the analyzer gateway.
    pub fn analyzer(&self) -> &AnalyzerGateway {
        &self.analyzer
    }

    /// Returns the OCR extractor.
    pub fn extractor(&self) -> &TextExtractor {
        &self.extractor
    }

    /// Scans one label photo.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty user id
    /// - `InvalidImage` for an empty, oversize or unrecognized image
    /// - `OcrFailed` / `InsufficientText` when no usable text is found
    /// - `Persistence` when the record cannot be written within the retry budget
    ///
    /// Remote classifier, analyzer, upload, allergy lookup, cache and event
    /// failures never fail the scan.
    pub async fn submit(&self, request: ScanRequest) -> ScanResult<ScanRecord> {
        let span = tracing::info_span!(
            "scan",
            correlation_id = %request.correlation_id(),
            user_id = %request.user_id()
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: ScanRequest) -> ScanResult<ScanRecord> {
        let started = Instant::now();
        let correlation_id = request.correlation_id();
        let user_id = request.user_id();
        reached(ScanStage::Received);

        if user_id.trim().is_empty() {
            return Err(ScanError::invalid_request("user id is required"));
        }
        let format = validate_image(request.image(), self.config.max_image_bytes)?;
        let digest = self.hasher.digest(request.image());
        audit::emit_scan_started(correlation_id, user_id, &digest, format, request.image().len());
        reached(ScanStage::Validated);

        if let Some(record) = self.cached_scan(user_id, &digest).await {
            audit::emit_scan_cache_hit(correlation_id, CacheKind::Scan, &digest);
            audit::emit_scan_completed(&ScanAuditEvent::completed(&record, true, started.elapsed()));
            reached(ScanStage::Done);
            return Ok(record);
        }
        reached(ScanStage::CacheChecked);

        let upload = self.spawn_upload(&request, &digest, format);

        let (enrichment, allergies) = tokio::join!(
            self.enrich(request.image(), &digest, correlation_id),
            self.user_allergies(user_id, correlation_id),
        );
        let enrichment = enrichment?;

        let allergens = check_allergens(enrichment.classification.detected_allergens(), &allergies);
        if !allergens.is_safe() {
            tracing::warn!(matched = ?allergens.matched, "user allergens detected");
        }
        reached(ScanStage::AllergenChecked);

        let image_url = match upload {
            Some(task) => task.join(correlation_id).await,
            None => None,
        };

        let draft = build_record(RecordParts {
            user_id,
            requested_name: request.product_name(),
            enrichment: &enrichment,
            allergens: &allergens,
            image_url,
        });

        let repository = &self.repository;
        let draft = &draft;
        let record = with_retry(&self.config.persistence_retry, "persist_scan", move || {
            repository.create(draft.clone())
        })
        .await
        .map_err(|err| ScanError::Persistence {
            attempts: err.attempts(),
            message: err.inner().to_string(),
        })?;
        tracing::info!(scan_id = %record.id, "scan persisted");
        reached(ScanStage::Persisted);

        self.emit_created(&record);
        reached(ScanStage::EventEmitted);

        self.cache.put_scan(user_id, &digest, &record).await;

        audit::emit_scan_completed(&ScanAuditEvent::completed(&record, false, started.elapsed()));
        reached(ScanStage::Done);
        Ok(record)
    }

    /// Returns the cached record unless the repository says it is gone.
    async fn cached_scan(&self, user_id: &str, digest: &ContentDigest) -> Option<ScanRecord> {
        let record = self.cache.get_scan(user_id, digest).await?;
        match self.repository.find_by_id(&record.id).await {
            Ok(Some(_)) => Some(record),
            Ok(None) => {
                tracing::debug!(scan_id = %record.id, "cached scan was deleted, evicting");
                self.cache.evict_scan(user_id, digest).await;
                None
            }
            Err(err) => {
                tracing::debug!(error = %err, "could not confirm cached scan, serving it");
                Some(record)
            }
        }
    }

    fn spawn_upload(
        &self,
        request: &ScanRequest,
        digest: &ContentDigest,
        format: ImageFormat,
    ) -> Option<UploadTask> {
        let store = Arc::clone(self.image_store.as_ref()?);
        let key = image_key(request.user_id(), digest.as_str(), format);
        let data = request.shared_image();
        let handle = tokio::spawn(
            async move { store.upload(&key, data, format).await }
                .instrument(tracing::Span::current()),
        );
        Some(UploadTask {
            handle: Some(handle),
        })
    }

    async fn user_allergies(&self, user_id: &str, correlation_id: &str) -> Vec<String> {
        let Some(users) = &self.users else {
            return Vec::new();
        };
        match users.allergies(user_id).await {
            Ok(allergies) => allergies,
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(error = %reason, "allergy lookup failed, assuming none");
                audit::emit_scan_degraded(correlation_id, DegradedStage::AllergyLookup, &reason);
                Vec::new()
            }
        }
    }

    /// OCR, classification and analysis, from cache when possible.
    async fn enrich(
        &self,
        image: &[u8],
        digest: &ContentDigest,
        correlation_id: &str,
    ) -> ScanResult<EnrichmentBundle> {
        if let Some(bundle) = self.cache.get_enrichment(digest).await {
            audit::emit_scan_cache_hit(correlation_id, CacheKind::Enrichment, digest);
            return Ok(bundle);
        }

        let extracted = self.extractor.extract(image).await?;
        let text = extracted.text.as_str();
        reached(ScanStage::TextExtracted);

        let deadline = Instant::now() + self.config.enrichment_deadline;

        let classification =
            match tokio::time::timeout_at(deadline, self.classifier.classify(text)).await {
                Ok(classification) => classification,
                Err(_) => {
                    tracing::warn!("enrichment deadline expired during classification");
                    fallback_classification(text)
                }
            };
        if classification.is_degraded() {
            audit::emit_scan_degraded(
                correlation_id,
                DegradedStage::Classification,
                classification.provenance.name(),
            );
        }
        reached(ScanStage::Classified);

        let analysis = match tokio::time::timeout_at(
            deadline,
            self.analyzer.analyze(text, &classification),
        )
        .await
        {
            Ok(analysis) => analysis,
            Err(_) => {
                tracing::warn!("enrichment deadline expired during analysis");
                fallback_analysis(text, classification.group)
            }
        };
        if analysis.is_fallback {
            audit::emit_scan_degraded(correlation_id, DegradedStage::Analysis, "fallback");
        }
        reached(ScanStage::Analyzed);

        let bundle = EnrichmentBundle {
            extracted,
            classification,
            analysis,
        };
        self.cache.put_enrichment(digest, &bundle).await;
        Ok(bundle)
    }

    /// Hands the creation event to the publisher without waiting for it.
    fn emit_created(&self, record: &ScanRecord) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let publisher = Arc::clone(publisher);
        let event = ScanCreatedEvent::for_record(record);
        tokio::spawn(
            async move {
                if let Err(err) = publisher.publish(ScanCreatedEvent::TOPIC, event).await {
                    tracing::error!(error = %err, topic = ScanCreatedEvent::TOPIC, "event publish failed");
                }
            }
            .instrument(tracing::Span::current()),
        );
    }

    /// Fetches one of a user's scans.
    pub async fn get_scan(&self, scan_id: &ScanId, user_id: &str) -> ScanResult<ScanRecord> {
        let record = self
            .repository
            .find_by_id(scan_id)
            .await?
            .ok_or_else(|| ScanError::not_found(scan_id.as_str()))?;
        if record.user_id != user_id {
            tracing::warn!(scan_id = %scan_id, user_id = %user_id, "scan access denied");
            return Err(ScanError::access_denied(scan_id.as_str()));
        }
        Ok(record)
    }

    /// Lists a user's scans newest first.
    ///
    /// A `limit` of zero selects the default page size.
    pub async fn list_scans(&self, user_id: &str, limit: u64, offset: u64) -> ScanResult<ScanPage> {
        let limit = self.config.page_size(Some(limit));
        let (data, total) = tokio::try_join!(
            self.repository.list_for_user(user_id, limit, offset),
            self.repository.count_for_user(user_id),
        )?;
        Ok(ScanPage {
            data,
            total,
            page: offset / limit + 1,
            limit,
        })
    }

    /// Deletes one of a user's scans.
    pub async fn delete_scan(&self, scan_id: &ScanId, user_id: &str) -> ScanResult<()> {
        self.get_scan(scan_id, user_id).await?;
        if !self.repository.delete(scan_id).await? {
            return Err(ScanError::not_found(scan_id.as_str()));
        }
        tracing::info!(scan_id = %scan_id, "scan deleted");
        Ok(())
    }

    /// Checks every dependency concurrently.
    pub async fn health(&self) -> Vec<ServiceHealth> {
        let checks: Vec<BoxFuture<'_, ServiceHealth>> = vec![
            gateway_health(
                CLASSIFIER_DEPENDENCY,
                self.classifier.is_configured(),
                self.classifier.breaker(),
                self.classifier.health_check(),
            )
            .boxed(),
            gateway_health(
                ANALYZER_DEPENDENCY,
                self.analyzer.is_configured(),
                self.analyzer.breaker(),
                self.analyzer.health_check(),
            )
            .boxed(),
            check_service(REPOSITORY_DEPENDENCY, None, self.repository.ping()).boxed(),
        ];
        join_all(checks).await
    }

    /// Returns the current state of every breaker.
    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        vec![
            self.classifier.breaker().snapshot(),
            self.analyzer.breaker().snapshot(),
        ]
    }
}

impl fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("extractor", &self.extractor)
            .field("classifier", &self.classifier)
            .field("analyzer", &self.analyzer)
            .field("repository", &self.repository)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockAnalyzer, MockClassifier, MockOcrEngine, MockOcrFactory};
    use crate::gateway::FALLBACK_CONFIDENCE;
    use crate::ocr::OcrConfig;
    use crate::orchestrator::HealthStatus;
    use crate::retry::RetryPolicy;
    use crate::store::{InMemoryImageStore, InMemoryScanRepository};
    use std::time::Duration;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    fn extractor(engine: MockOcrEngine) -> TextExtractor {
        TextExtractor::new(Arc::new(MockOcrFactory::new(engine)), OcrConfig::default())
    }

    fn builder(repo: &InMemoryScanRepository) -> ScanOrchestratorBuilder {
        ScanOrchestrator::builder()
            .with_extractor(extractor(MockOcrEngine::new()))
            .with_repository(repo.clone())
    }

    #[test]
    fn test_builder_requires_extractor_and_repository() {
        let missing_ocr = ScanOrchestrator::builder()
            .with_repository(InMemoryScanRepository::new())
            .build();
        assert!(matches!(missing_ocr, Err(ScanError::Configuration { .. })));

        let missing_repo = ScanOrchestrator::builder()
            .with_extractor(extractor(MockOcrEngine::new()))
            .build();
        assert!(matches!(missing_repo, Err(ScanError::Configuration { .. })));
    }

    #[test]
    fn test_stages_are_ordered() {
        assert!(ScanStage::Received < ScanStage::Validated);
        assert!(ScanStage::Analyzed < ScanStage::AllergenChecked);
        assert!(ScanStage::EventEmitted < ScanStage::Done);
        assert_eq!(ScanStage::CacheChecked.name(), "cache_checked");
    }

    #[tokio::test]
    async fn test_blank_user_rejected_before_ocr() {
        let repo = InMemoryScanRepository::new();
        let engine = MockOcrEngine::new();
        let orchestrator = ScanOrchestrator::builder()
            .with_extractor(extractor(engine.clone()))
            .with_repository(repo.clone())
            .build()
            .unwrap();

        let result = orchestrator.submit(ScanRequest::new(PNG, "  ")).await;
        assert!(matches!(result, Err(ScanError::InvalidRequest { .. })));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_degrades_to_fallback() {
        let repo = InMemoryScanRepository::new();
        let classifier = MockClassifier::new().with_latency(Duration::from_secs(50));
        let analyzer = MockAnalyzer::new();
        let orchestrator = builder(&repo)
            .with_classifier(classifier.clone())
            .with_analyzer(analyzer.clone())
            .with_classifier_config(
                ClassifierConfig::default()
                    .with_timeout(Duration::from_secs(120))
                    .with_retry(RetryPolicy::no_retry()),
            )
            .build()
            .unwrap();

        let started = Instant::now();
        let record = orchestrator.submit(ScanRequest::new(PNG, "u1")).await.unwrap();

        assert_eq!(record.classification_confidence, FALLBACK_CONFIDENCE);
        assert_eq!(classifier.call_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(50));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_scan_is_not_served_from_cache() {
        let repo = InMemoryScanRepository::new();
        let orchestrator = builder(&repo).build().unwrap();

        let first = orchestrator.submit(ScanRequest::new(PNG, "u1")).await.unwrap();
        orchestrator.delete_scan(&first.id, "u1").await.unwrap();

        let second = orchestrator.submit(ScanRequest::new(PNG, "u1")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(repo.create_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_aborted_when_ocr_fails() {
        let repo = InMemoryScanRepository::new();
        let store = InMemoryImageStore::default().with_latency(Duration::from_secs(5));
        let orchestrator = ScanOrchestrator::builder()
            .with_extractor(extractor(MockOcrEngine::new().with_failure("blurred")))
            .with_repository(repo.clone())
            .with_image_store(store.clone())
            .build()
            .unwrap();

        let result = orchestrator.submit(ScanRequest::new(PNG, "u1")).await;
        assert!(matches!(result, Err(ScanError::OcrFailed { .. })));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.object_count(), 0);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_every_dependency() {
        let repo = InMemoryScanRepository::new();
        let classifier = MockClassifier::new();
        let orchestrator = builder(&repo)
            .with_classifier(classifier.clone())
            .build()
            .unwrap();

        classifier.set_healthy(false);
        repo.set_unavailable(true);
        let report = orchestrator.health().await;
        let status: Vec<_> = report.iter().map(|h| (h.service.as_str(), h.status)).collect();
        assert_eq!(
            status,
            [
                (CLASSIFIER_DEPENDENCY, HealthStatus::Degraded),
                (ANALYZER_DEPENDENCY, HealthStatus::Degraded),
                (REPOSITORY_DEPENDENCY, HealthStatus::Degraded),
            ]
        );

        orchestrator.classifier().breaker().force_open();
        let report = orchestrator.health().await;
        assert_eq!(report[0].status, HealthStatus::Unhealthy);

        classifier.set_healthy(true);
        repo.set_unavailable(false);
        let report = orchestrator.health().await;
        assert_eq!(report[0].status, HealthStatus::Healthy);
        assert_eq!(report[2].status, HealthStatus::Healthy);
        assert_eq!(orchestrator.breakers().len(), 2);
    }
}
