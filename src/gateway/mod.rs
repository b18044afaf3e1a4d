//! Resilient gateways to the enrichment dependencies.
//!
//! Each gateway owns a circuit breaker and a retry policy and never fails:
//! when the remote side is unavailable it answers from local rules, and the
//! result says so through [`Provenance`](crate::core::Provenance) or
//! `is_fallback`.

mod analyzer;
mod classifier;
pub mod fallback;
pub mod response;

pub use analyzer::{build_prompt, AnalyzerConfig, AnalyzerGateway, ANALYZER_DEPENDENCY};
pub use classifier::{
    apply_hybrid_rule, validate_remote, ClassifierConfig, ClassifierGateway, CLASSIFIER_DEPENDENCY,
};
pub use fallback::{
    detect_allergens, extract_additives, fallback_analysis, fallback_classification,
    fallback_group, FALLBACK_CONFIDENCE, FALLBACK_PRODUCT_NAME,
};
pub use response::{parse_analysis, ResponseError, UNKNOWN_PRODUCT};
