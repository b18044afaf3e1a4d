//! Gemini generative analyzer.
//!
//! Uses the `generateContent` REST endpoint with a JSON response MIME type
//! and a low temperature, then returns the first candidate's text.

use crate::backends::http::{self, Credential};
use crate::backends::AnalyzerBackend;
use crate::core::DependencyError;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key (kept secret).
    pub api_key: SecretString,
    /// Model name.
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GeminiConfig {
    /// Creates a configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into().into()),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(30),
            temperature: 0.2,
        }
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
pub(super) struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    /// Mean token log-probability, when the model reports it.
    avg_logprobs: Option<f64>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        self.into_candidate().map(|(text, _)| text)
    }

    /// First candidate's non-blank text and its mean log-probability.
    pub(super) fn into_candidate(self) -> Option<(String, Option<f64>)> {
        let candidate = self.candidates.into_iter().next()?;
        let avg_logprobs = candidate.avg_logprobs;
        let text: String = candidate
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.trim().is_empty()).then_some((text, avg_logprobs))
    }
}

/// Analyzer backed by Gemini.
#[derive(Debug)]
pub struct GeminiAnalyzer {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiAnalyzer {
    /// Creates a new Gemini client.
    pub fn new(config: GeminiConfig) -> Result<Self, DependencyError> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn model_url(&self) -> String {
        format!(
            "{}/models/{}",
            http::trim_base(&self.config.base_url),
            self.config.model
        )
    }
}

#[async_trait]
impl AnalyzerBackend for GeminiAnalyzer {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, DependencyError> {
        let request = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: 0.8,
                top_k: 40,
                response_mime_type: "application/json",
            },
        };

        let response: GenerateResponse = http::post_json(
            &self.client,
            self.name(),
            self.config.timeout,
            &format!("{}:generateContent", self.model_url()),
            Credential::Header("x-goog-api-key", &self.config.api_key),
            &request,
        )
        .await?;

        response
            .into_text()
            .ok_or_else(|| DependencyError::invalid_response(self.name(), "no candidate text"))
    }

    async fn health_check(&self) -> Result<(), DependencyError> {
        http::probe(
            &self.client,
            self.name(),
            self.config.timeout,
            &self.model_url(),
            Credential::Header("x-goog-api-key", &self.config.api_key),
        )
        .await
    }
}
