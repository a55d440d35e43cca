//! Audit hook for sensitive fields that were served without being decoded.
//!
//! Every time a decrypted view falls back to a field's stored value, the
//! repository reports a [`FallbackEvent`] to the configured [`AuditSink`].
//! Events identify the record and field path only; they never carry the
//! stored value or any plaintext.

use tracing::warn;
use uuid::Uuid;

use crate::crypto::DecodeFailure;
use crate::records::model::{FormatVersion, RecordKind};

/// One sensitive field returned in its stored form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEvent {
    pub record_id: Uuid,
    pub kind: RecordKind,
    pub format: FormatVersion,
    /// Dot-notation path of the field.
    pub path: String,
    pub reason: DecodeFailure,
}

/// Receiver for decode fallbacks.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn record_fallback(&self, event: &FallbackEvent);
}

/// [`AuditSink`] that emits a structured `warn` event on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_fallback(&self, event: &FallbackEvent) {
        warn!(
            target: "audit",
            record_id = %event.record_id,
            kind = %event.kind,
            format = event.format.as_str(),
            path = %event.path,
            reason = event.reason.as_str(),
            "sensitive field served undecoded"
        );
    }
}
