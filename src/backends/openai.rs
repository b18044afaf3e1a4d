//! OpenAI chat-completions analyzer.

use crate::backends::http::{self, Credential};
use crate::backends::AnalyzerBackend;
use crate::core::DependencyError;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You are a food scientist. Answer with a single JSON object and nothing else.";

/// OpenAI configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
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

impl OpenAiConfig {
    /// Creates a configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into().into()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
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
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Analyzer backed by OpenAI chat completions.
#[derive(Debug)]
pub struct OpenAiAnalyzer {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAnalyzer {
    /// Creates a new OpenAI client.
    pub fn new(config: OpenAiConfig) -> Result<Self, DependencyError> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", http::trim_base(&self.config.base_url), path)
    }
}

#[async_trait]
impl AnalyzerBackend for OpenAiAnalyzer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String, DependencyError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response: ChatResponse = http::post_json(
            &self.client,
            self.name(),
            self.config.timeout,
            &self.url("chat/completions"),
            Credential::Bearer(&self.config.api_key),
            &request,
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| DependencyError::invalid_response(self.name(), "empty completion"))
    }

    async fn health_check(&self) -> Result<(), DependencyError> {
        http::probe(
            &self.client,
            self.name(),
            self.config.timeout,
            &self.url(&format!("models/{}", self.config.model)),
            Credential::Bearer(&self.config.api_key),
        )
        .await
    }
}
