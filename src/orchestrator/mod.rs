//! Orchestration of a scan from photo to persisted record.
//!
//! ```text
//! RECEIVED -> VALIDATED -> CACHE_CHECKED -> TEXT_EXTRACTED -> CLASSIFIED
//!          -> ANALYZED -> ALLERGEN_CHECKED -> PERSISTED -> EVENT_EMITTED -> DONE
//! ```
//!
//! A per-user cache hit jumps straight to `DONE`. The image upload runs
//! alongside OCR and enrichment and is joined just before the record is
//! built.

pub mod allergen;
mod config;
pub mod health;
mod sanitize;
mod scan_orchestrator;

pub use allergen::{canonical_allergen, check_allergens, AllergenCheck};
pub use config::OrchestratorConfig;
pub use health::{HealthStatus, ServiceHealth};
pub use sanitize::{build_record, title_case, RecordParts};
pub use scan_orchestrator::{
    ScanOrchestrator, ScanOrchestratorBuilder, ScanStage, REPOSITORY_DEPENDENCY,
};
