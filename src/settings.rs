//! Layered runtime settings.
//!
//! Values are resolved from, lowest precedence first:
//!
//! 1. built-in defaults (the same values the `*Config::default()` impls use)
//! 2. an optional `config/nutriscan.{toml,…}` file
//! 3. `NUTRISCAN__SECTION__KEY` environment variables, e.g.
//!    `NUTRISCAN__CLASSIFIER__URL` or `NUTRISCAN__ANALYZER__PROVIDER`
//!
//! ```no_run
//! use nutriscan::settings::Settings;
//!
//! let settings = Settings::load()?;
//! let classifier = settings.classifier_config();
//! # Ok::<(), nutriscan::settings::SettingsError>(())
//! ```

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::core::DependencyError;
use crate::gateway::{AnalyzerConfig, ClassifierConfig};
use crate::ocr::OcrConfig;
#[cfg(feature = "remote")]
use crate::ocr::{OcrEngineFactory, TextExtractor};
use crate::orchestrator::{OrchestratorConfig, ScanOrchestratorBuilder};
use crate::retry::RetryPolicy;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
#[cfg(feature = "remote")]
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "config/nutriscan";
const ENV_PREFIX: &str = "NUTRISCAN";

/// Failure to load or apply settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A source could not be read or deserialized.
    #[error(transparent)]
    Build(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid setting `{key}`: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A remote backend could not be constructed.
    #[error("backend setup failed: {0}")]
    Backend(#[from] DependencyError),
}

impl SettingsError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Retry overrides. Unset fields keep the component's preset.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first.
    pub max_attempts: Option<u32>,
    /// Delay before the second attempt.
    pub initial_delay_ms: Option<u64>,
}

impl RetrySettings {
    fn apply(&self, mut policy: RetryPolicy) -> RetryPolicy {
        if let Some(attempts) = self.max_attempts {
            policy = policy.with_max_attempts(attempts);
        }
        if let Some(delay) = self.initial_delay_ms {
            policy = policy.with_initial_delay(Duration::from_millis(delay));
        }
        policy
    }
}

/// Circuit breaker overrides. Unset fields keep the component's preset.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: Option<u32>,
    /// Consecutive half-open successes that close it.
    pub success_threshold: Option<u32>,
    /// Seconds the circuit stays open before probing.
    pub open_secs: Option<u64>,
}

impl BreakerSettings {
    fn apply(&self, mut config: CircuitBreakerConfig) -> CircuitBreakerConfig {
        if let Some(threshold) = self.failure_threshold {
            config = config.with_failure_threshold(threshold);
        }
        if let Some(threshold) = self.success_threshold {
            config = config.with_success_threshold(threshold);
        }
        if let Some(secs) = self.open_secs {
            config = config.with_open_duration(Duration::from_secs(secs));
        }
        config
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Largest accepted image in bytes.
    pub max_image_bytes: usize,
    /// Seconds the remote enrichment stages may take after OCR.
    pub enrichment_deadline_secs: u64,
    /// Lifetime of cache entries in seconds.
    pub cache_ttl_secs: u64,
    /// Default history page size.
    pub default_page_size: u64,
    /// Largest history page size.
    pub max_page_size: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
            enrichment_deadline_secs: 45,
            cache_ttl_secs: 3600,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// `[ocr]` section.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Shortest accepted text.
    pub min_text_chars: usize,
    /// Text length cap.
    pub max_text_chars: usize,
    /// Recognition timeout in seconds.
    pub timeout_secs: u64,
    /// Gemini API key for the vision engine. Unset means no engine is built.
    pub api_key: Option<String>,
    /// Vision model override.
    pub model: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            min_text_chars: 5,
            max_text_chars: 5000,
            timeout_secs: 30,
            api_key: None,
            model: None,
            base_url: None,
        }
    }
}

impl fmt::Debug for OcrSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrSettings")
            .field("min_text_chars", &self.min_text_chars)
            .field("max_text_chars", &self.max_text_chars)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// `[classifier]` section.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Base URL of the prediction service. Unset means fallback only.
    pub url: Option<String>,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Confidence below which the rule-based group is used.
    pub hybrid_threshold: f32,
    /// Retry knobs.
    pub retry: RetrySettings,
    /// Breaker knobs.
    pub breaker: BreakerSettings,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: 10,
            hybrid_threshold: 0.5,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl fmt::Debug for ClassifierSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierSettings")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("hybrid_threshold", &self.hybrid_threshold)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// Generative analyzer provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerProvider {
    /// Google Gemini.
    #[default]
    Gemini,
    /// OpenAI chat completions.
    #[serde(alias = "open_ai")]
    OpenAi,
}

/// `[analyzer]` section.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Which provider to talk to.
    pub provider: AnalyzerProvider,
    /// Provider API key. Unset means fallback only.
    pub api_key: Option<String>,
    /// Model override.
    pub model: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Retry knobs.
    pub retry: RetrySettings,
    /// Breaker knobs.
    pub breaker: BreakerSettings,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::default(),
            api_key: None,
            model: None,
            base_url: None,
            timeout_secs: 30,
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl fmt::Debug for AnalyzerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerSettings")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// All runtime settings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `[pipeline]`
    pub pipeline: PipelineSettings,
    /// `[ocr]`
    pub ocr: OcrSettings,
    /// `[classifier]`
    pub classifier: ClassifierSettings,
    /// `[analyzer]`
    pub analyzer: AnalyzerSettings,
    /// `[persistence]` retry overrides.
    pub persistence: RetrySettings,
}

impl Settings {
    /// Loads defaults, then `config/nutriscan.*`, then `NUTRISCAN__*` variables.
    pub fn load() -> Result<Self, SettingsError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        Self::finish(builder.build()?)
    }

    /// Loads settings from a TOML document on top of the defaults.
    pub fn from_toml(document: &str) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        tracing::debug!(settings = ?settings, "settings loaded");
        Ok(settings)
    }

    /// Rejects values no component can work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.pipeline.max_image_bytes == 0 {
            return Err(SettingsError::invalid("pipeline.max_image_bytes", "must be positive"));
        }
        if self.ocr.max_text_chars < self.ocr.min_text_chars {
            return Err(SettingsError::invalid(
                "ocr.max_text_chars",
                format!("must be at least ocr.min_text_chars ({})", self.ocr.min_text_chars),
            ));
        }
        let threshold = self.classifier.hybrid_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SettingsError::invalid(
                "classifier.hybrid_threshold",
                format!("{threshold} is outside 0..=1"),
            ));
        }
        if self.classifier.url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(SettingsError::invalid("classifier.url", "must not be blank"));
        }
        Ok(())
    }

    /// OCR configuration.
    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig::default()
            .with_min_text_chars(self.ocr.min_text_chars)
            .with_max_text_chars(self.ocr.max_text_chars)
            .with_timeout(Duration::from_secs(self.ocr.timeout_secs))
    }

    /// Classifier gateway configuration.
    pub fn classifier_config(&self) -> ClassifierConfig {
        let section = &self.classifier;
        ClassifierConfig::default()
            .with_timeout(Duration::from_secs(section.timeout_secs))
            .with_retry(section.retry.apply(RetryPolicy::classifier()))
            .with_breaker(section.breaker.apply(CircuitBreakerConfig::classifier()))
            .with_hybrid_threshold(section.hybrid_threshold)
    }

    /// Analyzer gateway configuration.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        let section = &self.analyzer;
        AnalyzerConfig::default()
            .with_timeout(Duration::from_secs(section.timeout_secs))
            .with_retry(section.retry.apply(RetryPolicy::analyzer()))
            .with_breaker(section.breaker.apply(CircuitBreakerConfig::analyzer()))
    }

    /// Orchestrator configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let pipeline = &self.pipeline;
        OrchestratorConfig::default()
            .with_max_image_bytes(pipeline.max_image_bytes)
            .with_cache_ttl(Duration::from_secs(pipeline.cache_ttl_secs))
            .with_enrichment_deadline(Duration::from_secs(pipeline.enrichment_deadline_secs))
            .with_persistence_retry(self.persistence.apply(RetryPolicy::persistence()))
            .with_page_sizes(pipeline.default_page_size, pipeline.max_page_size)
    }

    /// Applies the gateway and orchestrator configuration to `builder` and,
    /// with the `remote` feature, installs the configured backends.
    pub fn apply(&self, builder: ScanOrchestratorBuilder) -> Result<ScanOrchestratorBuilder, SettingsError> {
        let builder = builder
            .with_classifier_config(self.classifier_config())
            .with_analyzer_config(self.analyzer_config())
            .with_config(self.orchestrator_config());

        #[cfg(feature = "remote")]
        let builder = {
            let mut builder = builder;
            if let Some(classifier) = self.classifier_backend()? {
                builder = builder.with_arc_classifier(classifier);
            }
            if let Some(analyzer) = self.analyzer_backend()? {
                builder = builder.with_arc_analyzer(analyzer);
            }
            builder
        };

        Ok(builder)
    }

    /// Builds the vision OCR engine factory when an API key is configured.
    #[cfg(feature = "remote")]
    pub fn ocr_factory(&self) -> Result<Option<Arc<dyn OcrEngineFactory>>, SettingsError> {
        use crate::backends::{GeminiConfig, GeminiOcrFactory};

        let section = &self.ocr;
        let Some(api_key) = section.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
            tracing::info!("no ocr api key configured, an OCR engine must be supplied");
            return Ok(None);
        };

        let mut config =
            GeminiConfig::new(api_key).with_timeout(Duration::from_secs(section.timeout_secs));
        if let Some(model) = &section.model {
            config = config.with_model(model.clone());
        }
        if let Some(url) = &section.base_url {
            config = config.with_base_url(url.clone());
        }
        tracing::info!(engine = "gemini-vision", "ocr engine selected");
        Ok(Some(Arc::new(GeminiOcrFactory::new(config))))
    }

    /// Builds and warms a [`TextExtractor`] over the configured OCR engine.
    #[cfg(feature = "remote")]
    pub async fn text_extractor(&self) -> Result<Option<TextExtractor>, SettingsError> {
        match self.ocr_factory()? {
            Some(factory) => Ok(Some(TextExtractor::warm_up(factory, self.ocr_config()).await)),
            None => Ok(None),
        }
    }

    /// Builds the HTTP classifier when a URL is configured.
    #[cfg(feature = "remote")]
    pub fn classifier_backend(&self) -> Result<Option<crate::backends::ArcClassifier>, SettingsError> {
        use crate::backends::{HttpClassifier, HttpClassifierConfig};

        let section = &self.classifier;
        let Some(url) = section.url.as_deref() else {
            tracing::info!("no classifier url configured, rule-based classification only");
            return Ok(None);
        };

        let mut config =
            HttpClassifierConfig::new(url).with_timeout(Duration::from_secs(section.timeout_secs));
        if let Some(token) = &section.token {
            config = config.with_token(token.clone());
        }
        Ok(Some(Arc::new(HttpClassifier::new(config)?)))
    }

    /// Builds the analyzer for the configured provider when an API key is set.
    #[cfg(feature = "remote")]
    pub fn analyzer_backend(&self) -> Result<Option<crate::backends::ArcAnalyzer>, SettingsError> {
        use crate::backends::{GeminiAnalyzer, GeminiConfig, OpenAiAnalyzer, OpenAiConfig};

        let section = &self.analyzer;
        let Some(api_key) = section.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
            tracing::info!(provider = ?section.provider, "no analyzer api key configured, local analysis only");
            return Ok(None);
        };
        let timeout = Duration::from_secs(section.timeout_secs);

        let backend: crate::backends::ArcAnalyzer = match section.provider {
            AnalyzerProvider::Gemini => {
                let mut config = GeminiConfig::new(api_key).with_timeout(timeout);
                if let Some(model) = &section.model {
                    config = config.with_model(model.clone());
                }
                if let Some(url) = &section.base_url {
                    config = config.with_base_url(url.clone());
                }
                Arc::new(GeminiAnalyzer::new(config)?)
            }
            AnalyzerProvider::OpenAi => {
                let mut config = OpenAiConfig::new(api_key).with_timeout(timeout);
                if let Some(model) = &section.model {
                    config = config.with_model(model.clone());
                }
                if let Some(url) = &section.base_url {
                    config = config.with_base_url(url.clone());
                }
                Arc::new(OpenAiAnalyzer::new(config)?)
            }
        };
        tracing::info!(provider = ?section.provider, backend = backend.name(), "analyzer backend selected");
        Ok(Some(backend))
    }
}
