//! OCR engine abstraction.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure inside an OCR engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcrError {
    /// The engine could not be initialized.
    #[error("failed to initialize OCR engine: {0}")]
    Initialization(String),

    /// The engine could not read the image.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The engine did not finish in time.
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),
}

/// Text and confidence as reported by an engine, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecognition {
    /// Raw recognized text.
    pub text: String,
    /// Engine confidence, either in [0, 1] or as a percentage.
    pub confidence: f32,
}

impl RawRecognition {
    /// Creates a new recognition result.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// Confidence mapped into [0, 1].
    ///
    /// Engines reporting percentages (values above 1) are scaled down.
    pub fn normalized_confidence(&self) -> f32 {
        if !self.confidence.is_finite() {
            return 0.0;
        }
        let value = if self.confidence > 1.0 {
            self.confidence / 100.0
        } else {
            self.confidence
        };
        value.clamp(0.0, 1.0)
    }
}

/// An initialized OCR engine.
///
/// Engines are deterministic per input: a failure on some bytes will repeat
/// on the same bytes, so callers do not retry.
#[async_trait]
pub trait OcrEngine: Send + Sync + Debug {
    /// Returns the engine name.
    fn name(&self) -> &str;

    /// Recognizes text in an image.
    async fn recognize(&self, image: &[u8]) -> Result<RawRecognition, OcrError>;
}

/// Creates OCR engine instances.
#[async_trait]
pub trait OcrEngineFactory: Send + Sync + Debug {
    /// Initializes a new engine instance.
    async fn create(&self) -> Result<Arc<dyn OcrEngine>, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_normalization() {
        assert_eq!(RawRecognition::new("x", 0.75).normalized_confidence(), 0.75);
        assert_eq!(RawRecognition::new("x", 87.0).normalized_confidence(), 0.87);
        assert_eq!(RawRecognition::new("x", 250.0).normalized_confidence(), 1.0);
        assert_eq!(RawRecognition::new("x", -3.0).normalized_confidence(), 0.0);
        assert_eq!(RawRecognition::new("x", f32::NAN).normalized_confidence(), 0.0);
    }
}
