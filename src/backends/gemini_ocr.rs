//! Gemini vision OCR engine.
//!
//! Sends the label photo inline next to a transcription prompt and reads the
//! ingredient list back as plain text. The engine holds only an HTTP client,
//! so "warming" it is cheap and a fresh engine per request works too.

use crate::backends::gemini::{GeminiConfig, GenerateResponse};
use crate::backends::http::{self, Credential};
use crate::core::{DependencyError, ImageFormat};
use crate::ocr::{OcrEngine, OcrEngineFactory, OcrError, RawRecognition};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::Arc;

const ENGINE_NAME: &str = "gemini-vision";

const TRANSCRIBE_PROMPT: &str = "Transcribe the ingredient list printed on this food label \
exactly as written, including any allergen statement. Return only the transcribed text with \
no commentary. If no ingredient list is legible, return nothing.";

/// Confidence reported when the model returns no log-probabilities.
pub const DEFAULT_CONFIDENCE: f32 = 0.85;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VisionRequest {
    contents: [VisionContent; 1],
    generation_config: VisionGenerationConfig,
}

#[derive(Serialize)]
struct VisionContent {
    role: &'static str,
    parts: [VisionPart; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum VisionPart {
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: &'static str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VisionGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

fn vision_request(image: &[u8], format: ImageFormat) -> VisionRequest {
    VisionRequest {
        contents: [VisionContent {
            role: "user",
            parts: [
                VisionPart::Image {
                    inline_data: InlineData {
                        mime_type: format.mime_type(),
                        data: BASE64_STANDARD.encode(image),
                    },
                },
                VisionPart::Text {
                    text: TRANSCRIBE_PROMPT,
                },
            ],
        }],
        generation_config: VisionGenerationConfig {
            temperature: 0.0,
            response_mime_type: "text/plain",
        },
    }
}

/// Maps a mean token log-probability to a [0, 1] confidence.
fn confidence_from_logprob(avg_logprobs: Option<f64>) -> f32 {
    match avg_logprobs {
        Some(logprob) if logprob.is_finite() => (logprob.exp() as f32).clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

fn recognition_error(err: DependencyError) -> OcrError {
    match err {
        DependencyError::Timeout { elapsed, .. } => OcrError::Timeout(elapsed),
        other => OcrError::Recognition(other.to_string()),
    }
}

/// OCR engine backed by a Gemini vision model.
#[derive(Debug)]
pub struct GeminiOcrEngine {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiOcrEngine {
    /// Creates a new engine.
    pub fn new(config: GeminiConfig) -> Result<Self, DependencyError> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            http::trim_base(&self.config.base_url),
            self.config.model
        )
    }
}

#[async_trait]
impl OcrEngine for GeminiOcrEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn recognize(&self, image: &[u8]) -> Result<RawRecognition, OcrError> {
        let format = ImageFormat::sniff(image)
            .ok_or_else(|| OcrError::Recognition("unsupported image format".to_string()))?;

        let response: GenerateResponse = http::post_json(
            &self.client,
            ENGINE_NAME,
            self.config.timeout,
            &self.endpoint(),
            Credential::Header("x-goog-api-key", &self.config.api_key),
            &vision_request(image, format),
        )
        .await
        .map_err(recognition_error)?;

        // No candidate text means nothing legible; the extractor rejects it
        // as insufficient text.
        let recognition = match response.into_candidate() {
            Some((text, avg_logprobs)) => {
                RawRecognition::new(text, confidence_from_logprob(avg_logprobs))
            }
            None => RawRecognition::new("", 0.0),
        };
        tracing::debug!(
            engine = ENGINE_NAME,
            image_bytes = image.len(),
            chars = recognition.text.len(),
            confidence = recognition.confidence,
            "vision transcription finished"
        );
        Ok(recognition)
    }
}

/// Creates [`GeminiOcrEngine`] instances.
#[derive(Debug, Clone)]
pub struct GeminiOcrFactory {
    config: GeminiConfig,
}

impl GeminiOcrFactory {
    /// Creates a factory for the given configuration.
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OcrEngineFactory for GeminiOcrFactory {
    async fn create(&self) -> Result<Arc<dyn OcrEngine>, OcrError> {
        if self.config.api_key.expose_secret().trim().is_empty() {
            return Err(OcrError::Initialization("gemini api key is empty".to_string()));
        }
        let engine = GeminiOcrEngine::new(self.config.clone())
            .map_err(|e| OcrError::Initialization(e.to_string()))?;
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_request_carries_inline_image_and_prompt() {
        let json = serde_json::to_value(vision_request(&PNG, ImageFormat::Png)).unwrap();
        let parts = &json["contents"][0]["parts"];

        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "iVBORw0KGgo=");
        assert!(parts[1]["text"].as_str().unwrap().contains("ingredient list"));
        assert_eq!(json["generationConfig"]["temperature"], 0.0);
        assert_eq!(json["generationConfig"]["responseMimeType"], "text/plain");
    }

    #[test]
    fn test_confidence_from_logprob() {
        assert_eq!(confidence_from_logprob(Some(0.0)), 1.0);
        assert!((confidence_from_logprob(Some(-0.1)) - 0.905).abs() < 0.001);
        assert_eq!(confidence_from_logprob(None), DEFAULT_CONFIDENCE);
        assert_eq!(confidence_from_logprob(Some(f64::NAN)), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_candidate_with_logprobs_decodes() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"sugar, salt"}]},"avgLogprobs":-0.05}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        let (text, logprob) = response.into_candidate().unwrap();
        assert_eq!(text, "sugar, salt");
        assert_eq!(logprob, Some(-0.05));
    }

    #[test]
    fn test_timeout_maps_to_ocr_timeout() {
        let err = recognition_error(DependencyError::timeout(ENGINE_NAME, Duration::from_secs(30)));
        assert_eq!(err, OcrError::Timeout(Duration::from_secs(30)));

        let err = recognition_error(DependencyError::status(ENGINE_NAME, 429, "quota"));
        assert!(matches!(err, OcrError::Recognition(_)));
    }

    #[tokio::test]
    async fn test_factory_rejects_blank_key() {
        let factory = GeminiOcrFactory::new(GeminiConfig::new("  "));
        assert!(matches!(
            factory.create().await,
            Err(OcrError::Initialization(_))
        ));

        let factory = GeminiOcrFactory::new(GeminiConfig::new("key"));
        let engine = factory.create().await.unwrap();
        assert_eq!(engine.name(), "gemini-vision");
    }

    #[tokio::test]
    async fn test_unsupported_bytes_fail_before_any_request() {
        let engine = GeminiOcrEngine::new(
            GeminiConfig::new("key").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();
        let err = engine.recognize(b"not an image").await.unwrap_err();
        assert_eq!(err, OcrError::Recognition("unsupported image format".to_string()));
    }
}
