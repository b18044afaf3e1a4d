//! End-to-end runs of the scan pipeline against in-memory collaborators.

use nutriscan::backends::{
    MockAnalyzer, MockClassifier, MockOcrEngine, MockOcrFactory, RemoteClassification,
};
use nutriscan::core::{DependencyError, ProcessingGroup, ScanError, ScanRequest};
use nutriscan::gateway::{FALLBACK_CONFIDENCE, FALLBACK_PRODUCT_NAME};
use nutriscan::ocr::{OcrConfig, TextExtractor};
use nutriscan::orchestrator::{OrchestratorConfig, ScanOrchestrator, ScanOrchestratorBuilder};
use nutriscan::store::{
    InMemoryEventBus, InMemoryImageStore, InMemoryScanRepository, StaticUserDirectory,
};

use std::sync::Arc;

const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn png(tag: u8) -> Vec<u8> {
    let mut bytes = PNG_HEADER.to_vec();
    bytes.extend_from_slice(&[tag; 16]);
    bytes
}

fn extractor(engine: MockOcrEngine) -> TextExtractor {
    TextExtractor::new(Arc::new(MockOcrFactory::new(engine)), OcrConfig::default())
}

struct Harness {
    engine: MockOcrEngine,
    classifier: MockClassifier,
    analyzer: MockAnalyzer,
    repo: InMemoryScanRepository,
    images: InMemoryImageStore,
    events: InMemoryEventBus,
}

impl Harness {
    fn new() -> Self {
        Self {
            engine: MockOcrEngine::new(),
            classifier: MockClassifier::new(),
            analyzer: MockAnalyzer::new(),
            repo: InMemoryScanRepository::new(),
            images: InMemoryImageStore::default(),
            events: InMemoryEventBus::new(),
        }
    }

    fn builder(&self) -> ScanOrchestratorBuilder {
        ScanOrchestrator::builder()
            .with_extractor(extractor(self.engine.clone()))
            .with_classifier(self.classifier.clone())
            .with_analyzer(self.analyzer.clone())
            .with_repository(self.repo.clone())
            .with_image_store(self.images.clone())
            .with_event_publisher(self.events.clone())
    }

    fn orchestrator(&self) -> ScanOrchestrator {
        self.builder().build().unwrap()
    }
}

/// Lets spawned publish tasks run to completion.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_full_scan_persists_enriched_record() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();

    assert_eq!(record.user_id, "user-1");
    assert_eq!(record.product_name, "Mock Product");
    assert_eq!(record.processing_group, ProcessingGroup::Processed);
    assert_eq!(record.classification_confidence, 0.9);
    assert_eq!(record.raw_text, "ingredients: wheat flour, sugar, palm oil, salt");
    assert!(record.is_safe);
    assert!(record.image_url.as_deref().unwrap().starts_with("memory://images/scans/user-1/"));
    assert_eq!(harness.images.object_count(), 1);
    assert_eq!(harness.repo.len(), 1);
    assert!(harness
        .analyzer
        .last_prompt()
        .unwrap()
        .contains("wheat flour"));
}

#[tokio::test]
async fn test_repeat_scan_served_from_cache() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let first = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();
    let second = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(harness.engine.call_count(), 1);
    assert_eq!(harness.classifier.call_count(), 1);
    assert_eq!(harness.analyzer.call_count(), 1);
    assert_eq!(harness.repo.create_calls(), 1);
}

#[tokio::test]
async fn test_enrichment_shared_across_users() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let mine = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();
    let theirs = orchestrator
        .submit(ScanRequest::new(png(1), "user-2"))
        .await
        .unwrap();

    assert_ne!(mine.id, theirs.id);
    assert_eq!(theirs.user_id, "user-2");
    assert_eq!(theirs.product_name, mine.product_name);
    assert_eq!(harness.engine.call_count(), 1);
    assert_eq!(harness.classifier.call_count(), 1);
    assert_eq!(harness.analyzer.call_count(), 1);
    assert_eq!(harness.repo.len(), 2);
}

#[tokio::test]
async fn test_declared_allergy_raises_alert() {
    let harness = Harness::new();
    harness.classifier.set_response(Ok(
        RemoteClassification::new(4, 0.95).with_allergens(["Peanut"])
    ));
    let users = StaticUserDirectory::new()
        .with_allergies("allergic", ["Peanut", "Soy"])
        .with_allergies("tolerant", ["Soy"]);
    let orchestrator = harness.builder().with_user_directory(users).build().unwrap();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "allergic"))
        .await
        .unwrap();
    assert!(!record.is_safe);
    assert_eq!(record.allergens, vec!["Peanut".to_string()]);
    assert_eq!(
        record.allergen_alert.as_deref(),
        Some("CRITICAL WARNING: Contains Peanut!")
    );

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "tolerant"))
        .await
        .unwrap();
    assert!(record.is_safe);
    assert_eq!(record.allergen_alert, None);
}

#[tokio::test]
async fn test_allergy_lookup_failure_assumes_none() {
    let harness = Harness::new();
    harness.classifier.set_response(Ok(
        RemoteClassification::new(4, 0.95).with_allergens(["Peanut"])
    ));
    let orchestrator = harness
        .builder()
        .with_user_directory(StaticUserDirectory::new().failing())
        .build()
        .unwrap();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();
    assert!(record.is_safe);
}

#[tokio::test]
async fn test_open_breakers_fall_back_locally() {
    let harness = Harness::new();
    let users = StaticUserDirectory::new().with_allergies("user-1", ["gluten"]);
    let orchestrator = harness.builder().with_user_directory(users).build().unwrap();
    orchestrator.classifier().breaker().force_open();
    orchestrator.analyzer().breaker().force_open();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();

    assert_eq!(record.classification_confidence, FALLBACK_CONFIDENCE);
    assert_eq!(record.product_name, FALLBACK_PRODUCT_NAME);
    assert!(!record.is_safe);
    assert!(record.allergens.contains(&"Gluten".to_string()));
    assert_eq!(harness.classifier.call_count(), 0);
    assert_eq!(harness.analyzer.call_count(), 0);

    // Degraded enrichment is not cached, so another user's scan re-runs OCR.
    orchestrator
        .submit(ScanRequest::new(png(1), "user-2"))
        .await
        .unwrap();
    assert_eq!(harness.engine.call_count(), 2);
}

#[tokio::test]
async fn test_open_breakers_use_rule_based_enrichment() {
    let mut harness = Harness::new();
    harness.engine = MockOcrEngine::new()
        .with_text("maltodextrin, hydrogenated oil, red 40, sodium benzoate, xanthan gum");
    let orchestrator = harness.orchestrator();
    orchestrator.classifier().breaker().force_open();
    orchestrator.analyzer().breaker().force_open();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();

    assert_eq!(record.processing_group, ProcessingGroup::UltraProcessed);
    assert_eq!(record.classification_confidence, 0.3);
    let additives: Vec<&str> = record.additives.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(additives, ["xanthan gum", "sodium benzoate", "red 40"]);
    assert_eq!(harness.repo.len(), 1);
    assert_eq!(harness.classifier.call_count(), 0);
    assert_eq!(harness.analyzer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_classifier_degrades_without_failing_scan() {
    let harness = Harness::new();
    harness.classifier.set_response(Err(DependencyError::status(
        "mock-classifier",
        503,
        "overloaded",
    )));
    let orchestrator = harness.orchestrator();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();

    assert_eq!(record.classification_confidence, FALLBACK_CONFIDENCE);
    assert_eq!(harness.classifier.call_count(), 2);
    assert_eq!(harness.repo.len(), 1);
}

#[tokio::test]
async fn test_invalid_images_rejected() {
    let harness = Harness::new();
    let orchestrator = harness
        .builder()
        .with_config(OrchestratorConfig::default().with_max_image_bytes(64))
        .build()
        .unwrap();

    let empty = orchestrator.submit(ScanRequest::new(Vec::new(), "user-1")).await;
    assert!(matches!(empty, Err(ScanError::InvalidImage { .. })));

    let mut oversize = PNG_HEADER.to_vec();
    oversize.resize(65, 0);
    let oversize = orchestrator.submit(ScanRequest::new(oversize, "user-1")).await;
    assert!(matches!(oversize, Err(ScanError::InvalidImage { .. })));

    let text = orchestrator
        .submit(ScanRequest::new(b"not an image at all".to_vec(), "user-1"))
        .await;
    assert!(matches!(text, Err(ScanError::InvalidImage { .. })));

    assert_eq!(harness.engine.call_count(), 0);
    assert!(harness.repo.is_empty());
}

#[tokio::test]
async fn test_unreadable_label_rejected() {
    let mut harness = Harness::new();
    harness.engine = MockOcrEngine::new().with_text(" ab \n");
    let orchestrator = harness.orchestrator();

    let result = orchestrator.submit(ScanRequest::new(png(1), "user-1")).await;
    match result {
        Err(err @ ScanError::InsufficientText { .. }) => assert!(err.is_client_error()),
        other => panic!("expected InsufficientText, got {other:?}"),
    }
    assert_eq!(harness.classifier.call_count(), 0);
    assert!(harness.repo.is_empty());
}

#[tokio::test]
async fn test_upload_failure_keeps_scan() {
    let harness = Harness::new();
    harness.images.set_failing(true);
    let orchestrator = harness.orchestrator();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();

    assert_eq!(record.image_url, None);
    assert_eq!(harness.repo.len(), 1);
}

#[tokio::test]
async fn test_exactly_one_event_published() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let record = orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();
    orchestrator
        .submit(ScanRequest::new(png(1), "user-1"))
        .await
        .unwrap();
    settle().await;

    let published = harness.events.published();
    assert_eq!(published.len(), 1);
    let (topic, event) = &published[0];
    assert_eq!(topic, "scan.created");
    assert_eq!(event.scan_id, record.id);
    assert_eq!(event.user_id, "user-1");
    assert!(event.is_safe);
}

#[tokio::test]
async fn test_publish_failure_is_swallowed() {
    let harness = Harness::new();
    harness.events.set_failing(true);
    let orchestrator = harness.orchestrator();

    let record = orchestrator.submit(ScanRequest::new(png(1), "user-1")).await;
    settle().await;

    assert!(record.is_ok());
    assert_eq!(harness.events.attempts(), 1);
    assert!(harness.events.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_persistence_retried_then_succeeds() {
    let harness = Harness::new();
    harness.repo.fail_next_creates(2);
    let orchestrator = harness.orchestrator();

    let record = orchestrator.submit(ScanRequest::new(png(1), "user-1")).await;

    assert!(record.is_ok());
    assert_eq!(harness.repo.create_calls(), 3);
    assert_eq!(harness.repo.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_persistence_exhaustion_fails_scan() {
    let harness = Harness::new();
    harness.repo.fail_next_creates(3);
    let orchestrator = harness.orchestrator();

    let result = orchestrator.submit(ScanRequest::new(png(1), "user-1")).await;

    assert!(matches!(result, Err(ScanError::Persistence { attempts: 3, .. })));
    assert!(harness.repo.is_empty());
    settle().await;
    assert_eq!(harness.events.attempts(), 0);
}

#[tokio::test]
async fn test_history_respects_ownership() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();

    let mut mine = Vec::new();
    for tag in 1..=3 {
        let record = orchestrator
            .submit(ScanRequest::new(png(tag), "owner").with_product_name(format!("bar {tag}")))
            .await
            .unwrap();
        mine.push(record);
    }
    orchestrator
        .submit(ScanRequest::new(png(9), "someone-else"))
        .await
        .unwrap();

    let page = orchestrator.list_scans("owner", 2, 0).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, 2);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0].id, mine[2].id);
    assert_eq!(page.data[0].product_name, "Bar 3");

    let page = orchestrator.list_scans("owner", 2, 2).await.unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, mine[0].id);

    let target = &mine[1].id;
    let fetched = orchestrator.get_scan(target, "owner").await.unwrap();
    assert_eq!(fetched.product_name, "Bar 2");

    let denied = orchestrator.get_scan(target, "someone-else").await;
    assert!(matches!(denied, Err(ScanError::AccessDenied { .. })));
    let denied = orchestrator.delete_scan(target, "someone-else").await;
    assert!(matches!(denied, Err(ScanError::AccessDenied { .. })));

    orchestrator.delete_scan(target, "owner").await.unwrap();
    let gone = orchestrator.get_scan(target, "owner").await;
    assert!(matches!(gone, Err(ScanError::NotFound { .. })));
    let again = orchestrator.delete_scan(target, "owner").await;
    assert!(matches!(again, Err(ScanError::NotFound { .. })));

    let page = orchestrator.list_scans("owner", 0, 0).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.limit, 20);
}
