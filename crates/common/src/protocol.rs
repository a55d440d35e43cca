//! Request and response types exchanged over the records HTTP API.
//!
//! Every type here is serialised as JSON. Record documents are arbitrary JSON
//! objects; sensitive fields inside them appear either in encoded form
//! (`<hex iv>:<hex ciphertext>`) or, for decrypted views only, as plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Record write / read
// ---------------------------------------------------------------------------

/// Request body for `POST /records/:kind`, `POST /records/:kind/legacy` and
/// `PUT /record/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRecordRequest {
    /// JSON object holding the record fields, sensitive fields in plaintext.
    pub document: serde_json::Value,
}

/// A record exactly as persisted: sensitive fields are never plaintext here
/// unless the record is in the legacy format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub id: Uuid,
    /// Record kind, e.g. `"patient"` or `"measurement"`.
    pub kind: String,
    /// Storage format tag: `"legacy"` or `"v1"`.
    pub format: String,
    /// Identifier of the key the sensitive fields are encoded under.
    pub key_id: Option<String>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response body for `GET /records/:kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordListResponse {
    pub records: Vec<RecordResponse>,
}

/// One sensitive field that could not be decoded and was returned raw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldFallbackResponse {
    /// Dot-notation path of the field, e.g. `"emergency_contact.phone"`.
    pub path: String,
    /// Machine-readable failure reason (`"format"`, `"hex"`, `"cipher"`, ...).
    pub reason: String,
}

/// Response body for `GET /record/:id/decrypted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptedRecordResponse {
    pub id: Uuid,
    pub kind: String,
    /// The record document with every decodable sensitive field in plaintext.
    pub document: serde_json::Value,
    /// Fields that were returned in their stored form instead of plaintext.
    pub fallbacks: Vec<FieldFallbackResponse>,
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

/// Response body for `POST /maintenance/reencrypt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReencryptResponse {
    /// Records examined.
    pub scanned: usize,
    /// `v1` records moved from a retired key to the active key.
    pub reencrypted: usize,
    /// Legacy records upgraded to `v1`.
    pub upgraded_legacy: usize,
    /// Records already current.
    pub skipped: usize,
    /// Records left untouched because a field could not be decoded.
    pub failed: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// Percentage of readings falling in each glucose band.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RangeBreakdown {
    pub very_low: f64,
    pub low: f64,
    pub in_range: f64,
    pub high: f64,
    pub very_high: f64,
}

/// Response body for `GET /patients/:id/glucose-summary`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlucoseSummaryResponse {
    pub patient_id: Uuid,
    pub readings: usize,
    pub mean_mg_dl: Option<f64>,
    pub min_mg_dl: Option<f64>,
    pub max_mg_dl: Option<f64>,
    /// Coefficient of variation, in percent.
    pub coefficient_of_variation: Option<f64>,
    /// Glucose management indicator, in percent.
    pub gmi: Option<f64>,
    pub time_in_range: RangeBreakdown,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Identifier of the key new values are encoded under.
    pub active_key_id: String,
    /// Number of records currently held by the store.
    pub records_stored: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_request_accepts_nested_document() {
        let body = r#"{"document":{"phone":"5551234567","address":{"city":"Izmir"}}}"#;
        let req: WriteRecordRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.document["address"]["city"], "Izmir");
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("not_found", "record does not exist");
        assert_eq!(e.code, "not_found");
        assert!(e.message.contains("does not exist"));
    }

    #[test]
    fn reencrypt_response_defaults_to_zero() {
        let r = ReencryptResponse::default();
        assert_eq!(r.scanned, 0);
        assert!(r.failed.is_empty());
    }

    #[test]
    fn decrypted_response_serialises_fallbacks() {
        let resp = DecryptedRecordResponse {
            id: Uuid::nil(),
            kind: "patient".into(),
            document: json!({"phone": "5551234567"}),
            fallbacks: vec![FieldFallbackResponse {
                path: "address".into(),
                reason: "hex".into(),
            }],
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["fallbacks"][0]["path"], "address");
        assert_eq!(value["kind"], "patient");
    }
}
