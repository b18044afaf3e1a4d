//! HTTP processing-level classifier.
//!
//! Talks to a JSON service exposing:
//!
//! - `POST {base}/predict` with `{"ingredients": "..."}`, answering
//!   `{group|nova_group, confidence, contributing_ingredients?, allergens?,
//!   reasons|processing_reasons?}`
//! - `GET {base}/health`

use crate::backends::http::{self, Credential};
use crate::backends::{ClassifierBackend, RemoteClassification};
use crate::core::DependencyError;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use std::time::Duration;

/// HTTP classifier configuration.
#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    /// Base URL of the service.
    pub base_url: String,
    /// Optional bearer token (kept secret).
    pub token: Option<SecretString>,
    /// Request timeout.
    pub timeout: Duration,
}

impl HttpClassifierConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into().into()));
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    ingredients: &'a str,
}

/// Classifier backed by an HTTP prediction service.
#[derive(Debug)]
pub struct HttpClassifier {
    config: HttpClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    /// Creates a new classifier client.
    pub fn new(config: HttpClassifierConfig) -> Result<Self, DependencyError> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn credential(&self) -> Credential<'_> {
        match &self.config.token {
            Some(token) => Credential::Bearer(token),
            None => Credential::None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", http::trim_base(&self.config.base_url), path)
    }
}

#[async_trait]
impl ClassifierBackend for HttpClassifier {
    fn name(&self) -> &str {
        "classifier"
    }

    async fn classify(&self, ingredients: &str) -> Result<RemoteClassification, DependencyError> {
        http::post_json(
            &self.client,
            self.name(),
            self.config.timeout,
            &self.url("predict"),
            self.credential(),
            &PredictRequest { ingredients },
        )
        .await
    }

    async fn health_check(&self) -> Result<(), DependencyError> {
        http::probe(
            &self.client,
            self.name(),
            self.config.timeout,
            &self.url("health"),
            self.credential(),
        )
        .await
    }
}
