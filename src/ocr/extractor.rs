//! Text extraction from label photos.

use crate::core::{ExtractedText, ScanError};
use crate::ocr::engine::{OcrEngine, OcrEngineFactory, OcrError};
use crate::ocr::normalize::normalize_ocr_text;

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Configuration for text extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    /// Normalized text shorter than this is rejected.
    pub min_text_chars: usize,
    /// Normalized text is truncated to this many characters.
    pub max_text_chars: usize,
    /// Upper bound for one recognition call.
    pub timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 5,
            max_text_chars: 5000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl OcrConfig {
    /// Sets the minimum accepted text length.
    pub fn with_min_text_chars(mut self, min: usize) -> Self {
        self.min_text_chars = min;
        self
    }

    /// Sets the text length cap.
    pub fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = max.max(self.min_text_chars);
        self
    }

    /// Sets the recognition timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Turns image bytes into normalized ingredient text.
///
/// Keeps one warmed engine for the life of the process. When no warm engine
/// is available a one-shot engine is created for the request.
pub struct TextExtractor {
    factory: Arc<dyn OcrEngineFactory>,
    warm: RwLock<Option<Arc<dyn OcrEngine>>>,
    config: OcrConfig,
}

impl TextExtractor {
    /// Creates an extractor without a warm engine.
    pub fn new(factory: Arc<dyn OcrEngineFactory>, config: OcrConfig) -> Self {
        Self {
            factory,
            warm: RwLock::new(None),
            config,
        }
    }

    /// Creates an extractor and tries to warm an engine.
    ///
    /// A failed warm-up is logged; requests then use one-shot engines.
    pub async fn warm_up(factory: Arc<dyn OcrEngineFactory>, config: OcrConfig) -> Self {
        let extractor = Self::new(factory, config);
        if let Err(e) = extractor.rewarm().await {
            tracing::warn!(error = %e, "OCR warm-up failed, using one-shot engines");
        }
        extractor
    }

    /// Replaces the warm engine with a freshly created one.
    pub async fn rewarm(&self) -> Result<(), OcrError> {
        let engine = self.factory.create().await?;
        tracing::info!(engine = engine.name(), "OCR engine warmed");
        *self
            .warm
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(engine);
        Ok(())
    }

    /// Returns `true` if a warm engine is loaded.
    pub fn is_warm(&self) -> bool {
        self.warm
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    async fn engine(&self) -> Result<Arc<dyn OcrEngine>, OcrError> {
        let warm = self
            .warm
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match warm {
            Some(engine) => Ok(engine),
            None => {
                tracing::debug!("no warm OCR engine, creating one-shot instance");
                self.factory.create().await
            }
        }
    }

    /// Extracts normalized text from an image.
    ///
    /// # Errors
    ///
    /// - `OcrFailed` if the engine fails, times out, or cannot be created.
    /// - `InsufficientText` if fewer than `min_text_chars` remain after
    ///   normalization.
    pub async fn extract(&self, image: &[u8]) -> Result<ExtractedText, ScanError> {
        let engine = self
            .engine()
            .await
            .map_err(|e| ScanError::ocr_failed(e.to_string()))?;

        let started = tokio::time::Instant::now();
        let raw = match tokio::time::timeout(self.config.timeout, engine.recognize(image)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(ScanError::ocr_failed(e.to_string())),
            Err(_) => {
                return Err(ScanError::ocr_failed(
                    OcrError::Timeout(self.config.timeout).to_string(),
                ))
            }
        };

        let text = normalize_ocr_text(&raw.text, self.config.max_text_chars);
        let length = text.chars().count();
        tracing::debug!(
            engine = engine.name(),
            raw_chars = raw.text.chars().count(),
            chars = length,
            duration_ms = started.elapsed().as_millis() as u64,
            "OCR finished"
        );

        if length < self.config.min_text_chars {
            return Err(ScanError::InsufficientText {
                length,
                min: self.config.min_text_chars,
            });
        }

        Ok(ExtractedText {
            text,
            confidence: raw.normalized_confidence(),
        })
    }
}

impl fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextExtractor")
            .field("warm", &self.is_warm())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockOcrEngine, MockOcrFactory};

    #[tokio::test]
    async fn test_extracts_and_normalizes() {
        let factory = MockOcrFactory::new(
            MockOcrEngine::new().with_text("WATER,\nSALT |  Sugar").with_confidence(92.0),
        );
        let extractor = TextExtractor::warm_up(Arc::new(factory), OcrConfig::default()).await;
        assert!(extractor.is_warm());

        let extracted = extractor.extract(b"img").await.unwrap();
        assert_eq!(extracted.text, "water, salt sugar");
        assert!((extracted.confidence - 0.92).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rejects_short_text() {
        let factory = MockOcrFactory::new(MockOcrEngine::new().with_text(" ab |\n"));
        let extractor = TextExtractor::warm_up(Arc::new(factory), OcrConfig::default()).await;

        let err = extractor.extract(b"img").await.unwrap_err();
        assert!(matches!(err, ScanError::InsufficientText { length: 2, min: 5 }));
    }

    #[tokio::test]
    async fn test_engine_failure_is_not_retried() {
        let engine = MockOcrEngine::new().with_failure("unreadable image");
        let factory = MockOcrFactory::new(engine.clone());
        let extractor = TextExtractor::warm_up(Arc::new(factory), OcrConfig::default()).await;

        let err = extractor.extract(b"img").await.unwrap_err();
        assert!(matches!(err, ScanError::OcrFailed { .. }));
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn test_one_shot_when_warm_up_fails() {
        let factory = MockOcrFactory::new(MockOcrEngine::new().with_text("flour, sugar"))
            .with_init_failures(1);
        let factory = Arc::new(factory);
        let extractor = TextExtractor::warm_up(factory.clone(), OcrConfig::default()).await;
        assert!(!extractor.is_warm());

        let extracted = extractor.extract(b"img").await.unwrap();
        assert_eq!(extracted.text, "flour, sugar");
        assert_eq!(factory.created_count(), 1);
        assert!(!extractor.is_warm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_ocr_failed() {
        let engine = MockOcrEngine::new()
            .with_text("flour, sugar")
            .with_latency(Duration::from_secs(60));
        let factory = MockOcrFactory::new(engine);
        let config = OcrConfig::default().with_timeout(Duration::from_secs(1));
        let extractor = TextExtractor::warm_up(Arc::new(factory), config).await;

        let err = extractor.extract(b"img").await.unwrap_err();
        match err {
            ScanError::OcrFailed { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
