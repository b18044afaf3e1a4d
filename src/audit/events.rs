//! Audit event types and emission functions.

use crate::cache::CacheKind;
use crate::circuit_breaker::StateKind;
use crate::core::{ContentDigest, ImageFormat, ScanRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target used for every audit event.
pub const AUDIT_TARGET: &str = "nutriscan::audit";

/// Pipeline stage that can degrade to a local fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStage {
    /// Processing-level classification.
    Classification,
    /// Semantic enrichment.
    Analysis,
    /// Image upload; the record has no image URL.
    Upload,
    /// User allergy lookup; the allergy set was treated as empty.
    AllergyLookup,
}

impl DegradedStage {
    /// Returns the name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Analysis => "analysis",
            Self::Upload => "upload",
            Self::AllergyLookup => "allergy_lookup",
        }
    }
}

/// Audit record of a completed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAuditEvent {
    /// Event type.
    pub event_type: String,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Persisted scan id.
    pub scan_id: String,
    /// Owner of the scan.
    pub user_id: String,
    /// Processing-level group.
    pub processing_group: u8,
    /// Classification confidence.
    pub classification_confidence: f32,
    /// Whether the product is safe for the user.
    pub is_safe: bool,
    /// Number of additives recorded.
    pub additive_count: usize,
    /// Whether the record was served from cache.
    pub cached: bool,
    /// End-to-end duration in milliseconds.
    pub duration_ms: u64,
}

impl ScanAuditEvent {
    /// Builds the event for a finished scan.
    pub fn completed(record: &ScanRecord, cached: bool, duration: Duration) -> Self {
        Self {
            event_type: "scan_completed".to_string(),
            timestamp: Utc::now(),
            scan_id: record.id.to_string(),
            user_id: record.user_id.clone(),
            processing_group: record.processing_group.level(),
            classification_confidence: record.classification_confidence,
            is_safe: record.is_safe,
            additive_count: record.additives.len(),
            cached,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Emits an audit event for a scan entering the pipeline.
pub fn emit_scan_started(
    correlation_id: &str,
    user_id: &str,
    digest: &ContentDigest,
    format: ImageFormat,
    size: usize,
) {
    tracing::info!(
        target: AUDIT_TARGET,
        event_type = "scan_started",
        correlation_id = %correlation_id,
        user_id = %user_id,
        content_digest = %digest,
        format = %format,
        size_bytes = size,
        "Scan started"
    );
}

/// Emits an audit event for a cache hit.
pub fn emit_scan_cache_hit(correlation_id: &str, kind: CacheKind, digest: &ContentDigest) {
    tracing::info!(
        target: AUDIT_TARGET,
        event_type = "scan_cache_hit",
        correlation_id = %correlation_id,
        cache_kind = kind.name(),
        content_digest = %digest.short(),
        "Cache hit"
    );
}

/// Emits an audit event for a stage that fell back to local data.
pub fn emit_scan_degraded(correlation_id: &str, stage: DegradedStage, reason: &str) {
    tracing::warn!(
        target: AUDIT_TARGET,
        event_type = "scan_degraded",
        correlation_id = %correlation_id,
        stage = stage.name(),
        reason = %reason,
        "Scan stage degraded"
    );
}

/// Emits an audit event for a finished scan.
pub fn emit_scan_completed(event: &ScanAuditEvent) {
    tracing::info!(
        target: AUDIT_TARGET,
        event_type = %event.event_type,
        scan_id = %event.scan_id,
        user_id = %event.user_id,
        processing_group = event.processing_group,
        classification_confidence = event.classification_confidence,
        is_safe = event.is_safe,
        additive_count = event.additive_count,
        cached = event.cached,
        duration_ms = event.duration_ms,
        "Scan completed"
    );
}

/// Emits an audit event for a circuit breaker state change.
pub fn emit_breaker_transition(name: &str, from: StateKind, to: StateKind) {
    tracing::info!(
        target: AUDIT_TARGET,
        event_type = "breaker_transition",
        dependency = %name,
        from = from.name(),
        to = to.name(),
        "Circuit breaker transition"
    );
}
