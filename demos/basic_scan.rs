//! Scans a label end to end with scripted backends and in-memory stores.
//!
//! Shows a healthy scan, a repeat served from the cache, and a scan while
//! both remote breakers are open.
//!
//! Run with: cargo run --example basic_scan
//! (set `RUST_LOG=nutriscan=debug,nutriscan::audit=info` for stage logs)

use nutriscan::backends::{
    MockAnalyzer, MockClassifier, MockOcrEngine, MockOcrFactory, RemoteClassification,
};
use nutriscan::ocr::TextExtractor;
use nutriscan::prelude::*;
use nutriscan::store::{
    InMemoryEventBus, InMemoryImageStore, InMemoryScanRepository, StaticUserDirectory,
};
use nutriscan::Settings;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn print_record(record: &ScanRecord) {
    println!("Scan ID: {}", record.id);
    println!("Product: {}", record.product_name);
    println!(
        "Processing group: {} ({:.0}% confidence)",
        record.processing_group,
        record.classification_confidence * 100.0
    );
    println!("Allergens: {:?}", record.allergens);
    match &record.allergen_alert {
        Some(alert) => println!("{alert}"),
        None => println!("Safe for this user"),
    }
    println!("Image: {}", record.image_url.as_deref().unwrap_or("(not uploaded)"));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nutriscan=info")),
        )
        .init();

    println!("=== Nutriscan Basic Scan Example ===\n");

    // Defaults, overridden by config/nutriscan.toml and NUTRISCAN__* variables.
    let settings = Settings::load()?;

    let engine = MockOcrEngine::new()
        .with_text("Ingredients: peanuts, sugar, palm oil, emulsifier (soy lecithin), salt");
    let extractor = TextExtractor::new(Arc::new(MockOcrFactory::new(engine)), settings.ocr_config());

    let classifier = MockClassifier::new()
        .with_response(RemoteClassification::new(4, 0.87).with_allergens(["Peanuts", "Soy"]));
    let users = StaticUserDirectory::new().with_allergies("user-123", ["peanut"]);
    let events = InMemoryEventBus::new();

    let builder = ScanOrchestrator::builder()
        .with_extractor(extractor)
        .with_repository(InMemoryScanRepository::new())
        .with_image_store(InMemoryImageStore::default())
        .with_event_publisher(events.clone())
        .with_user_directory(users);
    // Settings may install remote backends; the mocks below replace them here.
    let orchestrator = settings
        .apply(builder)?
        .with_classifier(classifier)
        .with_analyzer(MockAnalyzer::new())
        .build()?;

    let photo = {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(b"label photo");
        bytes
    };

    println!("--- First scan ---");
    let record = orchestrator
        .submit(ScanRequest::new(photo.clone(), "user-123").with_product_name("choco peanut bar"))
        .await?;
    print_record(&record);

    println!("\n--- Same photo again ---");
    let again = orchestrator.submit(ScanRequest::new(photo.clone(), "user-123")).await?;
    println!("Served from cache: {}", again.id == record.id);

    println!("\n--- Both remote services short-circuited ---");
    orchestrator.classifier().breaker().force_open();
    orchestrator.analyzer().breaker().force_open();
    let degraded = orchestrator.submit(ScanRequest::new(photo, "user-456")).await?;
    print_record(&degraded);

    println!("\n=== Dependencies ===");
    for health in orchestrator.health().await {
        println!(
            "{}: {} ({})",
            health.service,
            health.status,
            health.details.as_deref().unwrap_or("ok")
        );
    }
    for breaker in orchestrator.breakers() {
        println!("breaker {breaker:?}");
    }

    tokio::task::yield_now().await;
    println!("\nEvents published: {}", events.published().len());

    Ok(())
}
