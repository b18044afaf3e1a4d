//! Core types shared across the pipeline.
//!
//! - [`types`] - Classification, enrichment and persisted record types
//! - [`error`] - Structured error types
//! - [`input`] - Scan request and image validation
//! - [`hasher`] - BLAKE3 content digests

pub mod error;
pub mod hasher;
pub mod input;
pub mod types;

pub use error::{DependencyError, ScanError, ScanResult, StoreError};
pub use hasher::{ContentDigest, ContentHasher};
pub use input::{validate_image, ImageFormat, ScanRequest};
pub use types::{
    round2, AdditiveInfo, ClassificationResult, ExtractedText, NewScanRecord, NutriGrade,
    ProcessingGroup, Provenance, RiskLevel, ScanCreatedEvent, ScanId, ScanPage, ScanRecord,
    ScanSummary, SemanticAnalysis,
};
