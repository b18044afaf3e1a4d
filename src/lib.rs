//! # Nutriscan
//!
//! A resilient food-label scan pipeline: OCR, processing-level
//! classification, semantic enrichment and allergen checks behind circuit
//! breakers, retries and a content-addressed cache.
//!
//! ## Overview
//!
//! A scan takes a photo of an ingredient list and a user id and produces a
//! persisted [`ScanRecord`]:
//!
//! - Validate the image and hash its content
//! - Serve repeated scans from a per-user cache
//! - Extract and normalize the ingredient text
//! - Classify the processing level (remote model, rule-based fallback)
//! - Enrich with additives, a cleaner recipe and a nutrition grade
//! - Check detected allergens against the user's profile
//! - Persist with bounded retries and publish a `scan.created` event
//!
//! Remote stages never fail a scan. When a dependency is slow, failing or
//! short-circuited, the local fallback answers and the record is flagged
//! through its confidence and the audit log.
//!
//! ## Quick Start
//!
//! ```rust
//! use nutriscan::backends::{MockOcrEngine, MockOcrFactory};
//! use nutriscan::ocr::{OcrConfig, TextExtractor};
//! use nutriscan::store::InMemoryScanRepository;
//! use nutriscan::{ScanOrchestrator, ScanRequest};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MockOcrEngine::new().with_text("Ingredients: oats, honey, almonds");
//! let extractor = TextExtractor::new(Arc::new(MockOcrFactory::new(engine)), OcrConfig::default());
//!
//! let orchestrator = ScanOrchestrator::builder()
//!     .with_extractor(extractor)
//!     .with_repository(InMemoryScanRepository::new())
//!     .build()?;
//!
//! let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
//! let record = orchestrator.submit(ScanRequest::new(png, "user-1")).await?;
//! println!("{} is group {}", record.product_name, record.processing_group);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes `remote`
//! - `remote` - HTTP classifier, Gemini and OpenAI analyzers, and the Gemini
//!   vision OCR engine (`reqwest`)
//!
//! ## Architecture
//!
//! - **Core**: Records, errors, request validation and content hashing
//! - **Backends**: Remote classifier, analyzer and OCR implementations, mocks
//! - **Circuit Breaker** / **Retry**: Resilience around every remote call
//! - **Gateway**: Breaker-wrapped classification and analysis with fallbacks
//! - **Cache** / **Store**: Content-addressed cache and persistence seams
//! - **Orchestrator**: The scan state machine, history and health
//! - **Audit**: Structured scan events
//! - **Settings**: Layered configuration and backend selection

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod cache;
pub mod circuit_breaker;
pub mod core;
pub mod gateway;
pub mod ocr;
pub mod orchestrator;
pub mod retry;
pub mod settings;
pub mod store;

// Re-export commonly used types at the crate root
pub use crate::core::{
    ClassificationResult, ContentDigest, ContentHasher, DependencyError, NutriGrade,
    ProcessingGroup, Provenance, ScanError, ScanId, ScanPage, ScanRecord, ScanRequest,
    ScanResult, SemanticAnalysis, StoreError,
};

pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use crate::orchestrator::{
    HealthStatus, OrchestratorConfig, ScanOrchestrator, ScanOrchestratorBuilder, ServiceHealth,
};
pub use crate::retry::RetryPolicy;
pub use crate::settings::{Settings, SettingsError};

/// Prelude module for convenient imports.
///
/// ```rust
/// use nutriscan::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backends::{AnalyzerBackend, ClassifierBackend};
    pub use crate::cache::KeyValueCache;
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    pub use crate::core::{
        ClassificationResult, NutriGrade, ProcessingGroup, ScanError, ScanId, ScanRecord,
        ScanRequest, ScanResult,
    };
    pub use crate::orchestrator::{ScanOrchestrator, ScanOrchestratorBuilder};
    pub use crate::store::{EventPublisher, ImageStore, ScanRepository, UserDirectory};
}
