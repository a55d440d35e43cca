//! Persisted record shape and the tagged classification of sensitive fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::protocol::RecordResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{looks_encoded, DecodeFailure, EncodedValue};
use crate::keys::KeyId;

/// The kinds of document the service stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Patient,
    Doctor,
    Measurement,
    Prescription,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Patient,
        RecordKind::Doctor,
        RecordKind::Measurement,
        RecordKind::Prescription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Patient => "patient",
            RecordKind::Doctor => "doctor",
            RecordKind::Measurement => "measurement",
            RecordKind::Prescription => "prescription",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown record kind: {s}"))
    }
}

/// Storage format of a record's sensitive fields.
///
/// The tag is written with the record, so readers never have to guess from
/// field contents whether a `v1` value is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatVersion {
    /// Written before field encryption existed, or imported from such data.
    /// Fields may be plaintext or colon-encoded under an unrecorded key.
    Legacy,
    /// Every sensitive string field is an [`EncodedValue`] under `key_id`.
    V1,
}

impl FormatVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatVersion::Legacy => "legacy",
            FormatVersion::V1 => "v1",
        }
    }
}

/// A record exactly as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub format: FormatVersion,
    /// Present iff `format` is [`FormatVersion::V1`].
    pub key_id: Option<KeyId>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredRecord> for RecordResponse {
    fn from(r: StoredRecord) -> Self {
        RecordResponse {
            id: r.id,
            kind: r.kind.as_str().to_owned(),
            format: r.format.as_str().to_owned(),
            key_id: r.key_id.map(|k| k.as_str().to_owned()),
            document: r.document,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Classification of one stored sensitive field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Legacy plaintext, returned as-is.
    Plain(String),
    /// An encoded value. `key_id` is `None` for legacy records, where any
    /// loaded key may have produced it.
    Encoded {
        key_id: Option<KeyId>,
        value: EncodedValue,
    },
}

impl FieldValue {
    /// Classify `raw` according to the owning record's format.
    ///
    /// # Errors
    ///
    /// Returns the structural [`DecodeFailure`] when the value should be
    /// encoded (any `v1` value, or a colon-bearing legacy value) but does not
    /// parse as one.
    pub fn classify(raw: &str, record: &StoredRecord) -> Result<Self, DecodeFailure> {
        match record.format {
            FormatVersion::V1 => {
                // Empty values are never encoded.
                if raw.is_empty() {
                    return Ok(FieldValue::Plain(String::new()));
                }
                Ok(FieldValue::Encoded {
                    key_id: record.key_id.clone(),
                    value: raw.parse()?,
                })
            }
            FormatVersion::Legacy if looks_encoded(raw) => Ok(FieldValue::Encoded {
                key_id: None,
                value: raw.parse()?,
            }),
            FormatVersion::Legacy => Ok(FieldValue::Plain(raw.to_owned())),
        }
    }
}
