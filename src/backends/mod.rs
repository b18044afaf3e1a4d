//! Remote backend implementations.
//!
//! Two kinds of remote dependency feed the pipeline:
//!
//! - [`ClassifierBackend`] - processing-level classification of ingredient text
//! - [`AnalyzerBackend`] - a generative model answering a prompt with free text
//!
//! ## Available Backends
//!
//! - [`mock`] - scripted backends and OCR engines for tests
//! - `HttpClassifier` - JSON `POST /predict` endpoint (requires `remote` feature)
//! - `GeminiAnalyzer` / `OpenAiAnalyzer` - generative analyzers (requires `remote` feature)
//! - `GeminiOcrFactory` - vision-model OCR engine (requires `remote` feature)
//!
//! ## Implementing a Custom Backend
//!
//! ```rust,ignore
//! use nutriscan::backends::{AnalyzerBackend};
//! use nutriscan::core::DependencyError;
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct LocalModel;
//!
//! #[async_trait]
//! impl AnalyzerBackend for LocalModel {
//!     fn name(&self) -> &str {
//!         "local-model"
//!     }
//!
//!     async fn generate(&self, prompt: &str) -> Result<String, DependencyError> {
//!         todo!()
//!     }
//!
//!     async fn health_check(&self) -> Result<(), DependencyError> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::core::DependencyError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

pub mod mock;

#[cfg(feature = "remote")]
mod http;

#[cfg(feature = "remote")]
pub mod classifier_http;

#[cfg(feature = "remote")]
pub mod gemini;

#[cfg(feature = "remote")]
pub mod gemini_ocr;

#[cfg(feature = "remote")]
pub mod openai;

pub use mock::{MockAnalyzer, MockClassifier, MockOcrEngine, MockOcrFactory};

#[cfg(feature = "remote")]
pub use classifier_http::{HttpClassifier, HttpClassifierConfig};

#[cfg(feature = "remote")]
pub use gemini::{GeminiAnalyzer, GeminiConfig};

#[cfg(feature = "remote")]
pub use gemini_ocr::{GeminiOcrEngine, GeminiOcrFactory};

#[cfg(feature = "remote")]
pub use openai::{OpenAiAnalyzer, OpenAiConfig};

/// Response of a remote classifier, before validation.
///
/// Numeric fields are kept wide so out-of-range values reach validation
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteClassification {
    /// Processing-level group, expected in 1..=4.
    #[serde(alias = "nova_group")]
    pub group: i64,
    /// Confidence, expected in [0, 1].
    pub confidence: f64,
    /// Ingredients that drove the classification.
    #[serde(default)]
    pub contributing_ingredients: Option<Vec<String>>,
    /// Detected allergens.
    #[serde(default)]
    pub allergens: Option<Vec<String>>,
    /// Human-readable reasons.
    #[serde(default, alias = "processing_reasons")]
    pub reasons: Option<Vec<String>>,
}

impl RemoteClassification {
    /// Creates a response with only group and confidence.
    pub fn new(group: i64, confidence: f64) -> Self {
        Self {
            group,
            confidence,
            contributing_ingredients: None,
            allergens: None,
            reasons: None,
        }
    }

    /// Sets the detected allergens.
    pub fn with_allergens<I, S>(mut self, allergens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allergens = Some(allergens.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the reasons.
    pub fn with_reasons<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reasons = Some(reasons.into_iter().map(Into::into).collect());
        self
    }
}

/// A remote processing-level classifier.
#[async_trait]
pub trait ClassifierBackend: Send + Sync + Debug {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Classifies normalized ingredient text.
    async fn classify(&self, ingredients: &str) -> Result<RemoteClassification, DependencyError>;

    /// Performs a lightweight reachability check.
    async fn health_check(&self) -> Result<(), DependencyError>;
}

/// A generative text backend.
#[async_trait]
pub trait AnalyzerBackend: Send + Sync + Debug {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Answers a prompt with free text.
    async fn generate(&self, prompt: &str) -> Result<String, DependencyError>;

    /// Performs a lightweight reachability check.
    async fn health_check(&self) -> Result<(), DependencyError>;
}

/// Shared classifier backend.
pub type ArcClassifier = Arc<dyn ClassifierBackend>;

/// Shared analyzer backend.
pub type ArcAnalyzer = Arc<dyn AnalyzerBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification_aliases() {
        let json = r#"{"nova_group": 4, "confidence": 0.91, "processing_reasons": ["emulsifiers"]}"#;
        let parsed: RemoteClassification = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.group, 4);
        assert_eq!(parsed.reasons, Some(vec!["emulsifiers".to_string()]));
        assert_eq!(parsed.allergens, None);
    }

    #[test]
    fn test_remote_classification_keeps_out_of_range() {
        let parsed: RemoteClassification =
            serde_json::from_str(r#"{"group": 9, "confidence": 1.7}"#).unwrap();
        assert_eq!(parsed.group, 9);
        assert_eq!(parsed.confidence, 1.7);
    }
}
