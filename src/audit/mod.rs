//! Structured audit logging.
//!
//! Audit events are emitted through `tracing` under the `nutriscan::audit`
//! target, so any subscriber (JSON file, OpenTelemetry, ...) can capture them
//! separately from operational logs.

mod events;

pub use events::{
    emit_breaker_transition, emit_scan_cache_hit, emit_scan_completed, emit_scan_degraded,
    emit_scan_started, DegradedStage, ScanAuditEvent, AUDIT_TARGET,
};
