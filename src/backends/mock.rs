//! Scripted backends for testing.
//!
//! Every mock is cheap to clone and clones share their counters, so a test
//! can hand one copy to the pipeline and inspect calls through another.

use crate::backends::{AnalyzerBackend, ClassifierBackend, RemoteClassification};
use crate::core::DependencyError;
use crate::ocr::{OcrEngine, OcrEngineFactory, OcrError, RawRecognition};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared scripting state: queued one-off failures, then a steady response.
#[derive(Debug)]
struct Script<T> {
    response: Mutex<Result<T, DependencyError>>,
    queued_failures: Mutex<VecDeque<DependencyError>>,
    calls: AtomicU64,
    healthy: AtomicBool,
}

impl<T: Clone> Script<T> {
    fn new(response: T) -> Self {
        Self {
            response: Mutex::new(Ok(response)),
            queued_failures: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    fn next(&self) -> Result<T, DependencyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .queued_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match queued {
            Some(err) => Err(err),
            None => self
                .response
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }

    fn set_response(&self, response: Result<T, DependencyError>) {
        *self
            .response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = response;
    }

    fn queue_failures(&self, failures: impl IntoIterator<Item = DependencyError>) {
        self.queued_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(failures);
    }

    fn health(&self, name: &str) -> Result<(), DependencyError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DependencyError::connection_failed(name, "mock marked unhealthy"))
        }
    }
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// A scripted classifier.
///
/// # Examples
///
/// ```rust
/// use nutriscan::backends::{MockClassifier, RemoteClassification};
/// use nutriscan::core::DependencyError;
///
/// let classifier = MockClassifier::new()
///     .with_response(RemoteClassification::new(4, 0.92))
///     .with_failures([DependencyError::status("mock-classifier", 503, "warming up")]);
/// assert_eq!(classifier.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockClassifier {
    name: String,
    script: Arc<Script<RemoteClassification>>,
    latency: Option<Duration>,
}

impl MockClassifier {
    /// Creates a classifier answering group 3 with confidence 0.9.
    pub fn new() -> Self {
        Self {
            name: "mock-classifier".to_string(),
            script: Arc::new(Script::new(RemoteClassification::new(3, 0.9))),
            latency: None,
        }
    }

    /// Sets the name of this backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the steady-state response.
    pub fn with_response(self, response: RemoteClassification) -> Self {
        self.script.set_response(Ok(response));
        self
    }

    /// Makes every call fail with `error`.
    pub fn with_error(self, error: DependencyError) -> Self {
        self.script.set_response(Err(error));
        self
    }

    /// Queues one-off failures returned before the steady response.
    pub fn with_failures(self, failures: impl IntoIterator<Item = DependencyError>) -> Self {
        self.script.queue_failures(failures);
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replaces the steady-state response on a shared instance.
    pub fn set_response(&self, response: Result<RemoteClassification, DependencyError>) {
        self.script.set_response(response);
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.script.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns the number of `classify` calls.
    pub fn call_count(&self) -> u64 {
        self.script.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierBackend for MockClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, _ingredients: &str) -> Result<RemoteClassification, DependencyError> {
        let result = self.script.next();
        simulate_latency(self.latency).await;
        result
    }

    async fn health_check(&self) -> Result<(), DependencyError> {
        self.script.health(&self.name)
    }
}

/// A scripted generative analyzer.
#[derive(Debug, Clone)]
pub struct MockAnalyzer {
    name: String,
    script: Arc<Script<String>>,
    latency: Option<Duration>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

impl MockAnalyzer {
    /// Creates an analyzer answering with a small valid JSON document.
    pub fn new() -> Self {
        let body = r#"{"productName":"mock product","additives":[],"nutriScore":"C","cleanRecipe":"Mix and bake.","functionalCategories":[],"estimatedShelfLife":"6 months"}"#;
        Self {
            name: "mock-analyzer".to_string(),
            script: Arc::new(Script::new(body.to_string())),
            latency: None,
            last_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the name of this backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the steady-state text response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.script.set_response(Ok(text.into()));
        self
    }

    /// Makes every call fail with `error`.
    pub fn with_error(self, error: DependencyError) -> Self {
        self.script.set_response(Err(error));
        self
    }

    /// Queues one-off failures returned before the steady response.
    pub fn with_failures(self, failures: impl IntoIterator<Item = DependencyError>) -> Self {
        self.script.queue_failures(failures);
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.script.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns the number of `generate` calls.
    pub fn call_count(&self) -> u64 {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Returns the most recent prompt.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalyzerBackend for MockAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, DependencyError> {
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(prompt.to_string());
        let result = self.script.next();
        simulate_latency(self.latency).await;
        result
    }

    async fn health_check(&self) -> Result<(), DependencyError> {
        self.script.health(&self.name)
    }
}

/// A scripted OCR engine.
#[derive(Debug, Clone)]
pub struct MockOcrEngine {
    text: String,
    confidence: f32,
    failure: Option<String>,
    latency: Option<Duration>,
    calls: Arc<AtomicU64>,
}

impl MockOcrEngine {
    /// Creates an engine reading a short ingredient list.
    pub fn new() -> Self {
        Self {
            text: "Ingredients: wheat flour, sugar, palm oil, salt".to_string(),
            confidence: 0.9,
            failure: None,
            latency: None,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sets the recognized text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the reported confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Makes every recognition fail.
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of `recognize` calls.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    fn name(&self) -> &str {
        "mock-ocr"
    }

    async fn recognize(&self, _image: &[u8]) -> Result<RawRecognition, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        simulate_latency(self.latency).await;
        match &self.failure {
            Some(reason) => Err(OcrError::Recognition(reason.clone())),
            None => Ok(RawRecognition::new(self.text.clone(), self.confidence)),
        }
    }
}

/// A factory handing out clones of one [`MockOcrEngine`].
#[derive(Debug, Clone)]
pub struct MockOcrFactory {
    engine: MockOcrEngine,
    init_failures: Arc<AtomicU32>,
    created: Arc<AtomicU64>,
}

impl MockOcrFactory {
    /// Creates a factory for the given engine.
    pub fn new(engine: MockOcrEngine) -> Self {
        Self {
            engine,
            init_failures: Arc::new(AtomicU32::new(0)),
            created: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes the next `count` creations fail.
    pub fn with_init_failures(self, count: u32) -> Self {
        self.init_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Returns the number of engines successfully created.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngineFactory for MockOcrFactory {
    async fn create(&self) -> Result<Arc<dyn OcrEngine>, OcrError> {
        let failed = self
            .init_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(OcrError::Initialization("mock init failure".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.engine.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_failures_then_response() {
        let classifier = MockClassifier::new()
            .with_failures([DependencyError::status("mock-classifier", 503, "busy")]);

        assert!(classifier.classify("flour").await.is_err());
        let ok = classifier.classify("flour").await.unwrap();
        assert_eq!(ok.group, 3);
        assert_eq!(classifier.call_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let analyzer = MockAnalyzer::new();
        let handle = analyzer.clone();

        analyzer.generate("hello").await.unwrap();
        assert_eq!(handle.call_count(), 1);
        assert_eq!(handle.last_prompt().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_health_toggle() {
        let classifier = MockClassifier::new();
        assert!(classifier.health_check().await.is_ok());
        classifier.set_healthy(false);
        assert!(classifier.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_factory_init_failures() {
        let factory = MockOcrFactory::new(MockOcrEngine::new()).with_init_failures(2);
        assert!(factory.create().await.is_err());
        assert!(factory.create().await.is_err());
        assert!(factory.create().await.is_ok());
        assert_eq!(factory.created_count(), 1);
    }
}
