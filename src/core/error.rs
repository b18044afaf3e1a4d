//! Error types for the nutriscan pipeline.
//!
//! Caller-visible failures are [`ScanError`]. Remote-call failures are
//! [`DependencyError`] and never reach the caller: the gateways turn them
//! into fallback results. Collaborator failures (repository, object store,
//! event bus, user directory) are [`StoreError`].

use std::time::Duration;
use thiserror::Error;

/// The main error type for scan operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The uploaded image is empty, too large, or not a supported format.
    #[error("invalid image: {reason}")]
    InvalidImage {
        /// What is wrong with the image.
        reason: String,
    },

    /// The request itself is malformed (e.g. missing user id).
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What is wrong with the request.
        reason: String,
    },

    /// OCR produced too little text to classify.
    #[error("insufficient text extracted: {length} chars, at least {min} required")]
    InsufficientText {
        /// Length of the normalized text.
        length: usize,
        /// Minimum accepted length.
        min: usize,
    },

    /// The OCR engine failed on this image.
    #[error("OCR failed: {reason}")]
    OcrFailed {
        /// Engine failure description.
        reason: String,
    },

    /// The scan record could not be persisted after the retry budget.
    #[error("failed to persist scan after {attempts} attempts: {message}")]
    Persistence {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message.
        message: String,
    },

    /// No scan exists with the given id.
    #[error("scan not found: {scan_id}")]
    NotFound {
        /// The requested scan id.
        scan_id: String,
    },

    /// The scan belongs to another user.
    #[error("access denied to scan {scan_id}")]
    AccessDenied {
        /// The requested scan id.
        scan_id: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ScanError {
    /// Creates an `InvalidImage` error.
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidRequest` error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(scan_id: impl Into<String>) -> Self {
        Self::NotFound {
            scan_id: scan_id.into(),
        }
    }

    /// Creates an `AccessDenied` error.
    pub fn access_denied(scan_id: impl Into<String>) -> Self {
        Self::AccessDenied {
            scan_id: scan_id.into(),
        }
    }

    /// Creates an `OcrFailed` error.
    pub fn ocr_failed(reason: impl Into<String>) -> Self {
        Self::OcrFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the failure is caused by the caller's input.
    ///
    /// Client errors are reported directly and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidImage { .. }
                | Self::InvalidRequest { .. }
                | Self::InsufficientText { .. }
                | Self::OcrFailed { .. }
                | Self::NotFound { .. }
                | Self::AccessDenied { .. }
        )
    }
}

/// Failure of a call to a remote dependency (classifier, analyzer).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DependencyError {
    /// The call did not finish within its timeout.
    #[error("request to '{dependency}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the dependency.
        dependency: String,
        /// The timeout that expired.
        elapsed: Duration,
    },

    /// The dependency could not be reached.
    #[error("connection to '{dependency}' failed: {message}")]
    ConnectionFailed {
        /// Name of the dependency.
        dependency: String,
        /// Transport error message.
        message: String,
    },

    /// The dependency answered with a non-success HTTP status.
    #[error("'{dependency}' returned status {status}: {message}")]
    Status {
        /// Name of the dependency.
        dependency: String,
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response did not have the expected shape or values.
    #[error("invalid response from '{dependency}': {details}")]
    InvalidResponse {
        /// Name of the dependency.
        dependency: String,
        /// What failed validation.
        details: String,
    },

    /// The dependency has no endpoint or credentials configured.
    #[error("'{dependency}' is not configured")]
    NotConfigured {
        /// Name of the dependency.
        dependency: String,
    },
}

impl DependencyError {
    /// Creates a `Timeout` error.
    pub fn timeout(dependency: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            dependency: dependency.into(),
            elapsed,
        }
    }

    /// Creates a `ConnectionFailed` error.
    pub fn connection_failed(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Creates a `Status` error.
    pub fn status(dependency: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            dependency: dependency.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates an `InvalidResponse` error.
    pub fn invalid_response(dependency: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidResponse {
            dependency: dependency.into(),
            details: details.into(),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the name of the dependency that failed.
    pub fn dependency(&self) -> &str {
        match self {
            Self::Timeout { dependency, .. }
            | Self::ConnectionFailed { dependency, .. }
            | Self::Status { dependency, .. }
            | Self::InvalidResponse { dependency, .. }
            | Self::NotConfigured { dependency } => dependency,
        }
    }
}

/// Failure of an external collaborator (repository, object store, event bus).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The collaborator is temporarily unavailable.
    #[error("{store} unavailable: {reason}")]
    Unavailable {
        /// Name of the collaborator.
        store: String,
        /// Reason for unavailability.
        reason: String,
    },

    /// The collaborator did not answer in time.
    #[error("{store} operation timed out")]
    Timeout {
        /// Name of the collaborator.
        store: String,
    },

    /// The collaborator rejected the request; retrying will not help.
    #[error("{store} rejected the request: {reason}")]
    Rejected {
        /// Name of the collaborator.
        store: String,
        /// Reason for rejection.
        reason: String,
    },

    /// A value could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Rejected` error.
    pub fn rejected(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Maps the failure onto the HTTP status a service would report.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unavailable { .. } => Some(503),
            Self::Timeout { .. } => Some(504),
            Self::Rejected { .. } => Some(400),
            Self::Serialization(_) => None,
        }
    }
}

impl From<StoreError> for ScanError {
    fn from(err: StoreError) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;
