//! [`RecordRepository`]: the only place sensitive fields are encoded or decoded.
//!
//! Encoding is an explicit step of [`RecordRepository::create`] and
//! [`RecordRepository::update`]; decoding happens only in
//! [`RecordRepository::decrypted_view`] and the re-encryption job. Handlers and
//! the store never see the cipher.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::protocol::ReencryptResponse;
use common::ServiceError;

use crate::audit::{AuditSink, FallbackEvent};
use crate::crypto::{CodecError, DecodeFailure};
use crate::keys::CipherContext;

use super::model::{FieldValue, FormatVersion, RecordKind, StoredRecord};
use super::path::{for_each_leaf, for_each_string};
use super::policy::FieldPolicy;
use super::store::{RecordStore, StoreError};

/// Times `reencrypt_all` re-reads a record that keeps changing under it
/// before reporting it as failed.
const REENCRYPT_ATTEMPTS: usize = 3;

/// What a decrypted view does when a `v1` field fails to decode.
///
/// Legacy records always fall back: a failure there usually means the value
/// was plaintext that happened to contain a colon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeFailurePolicy {
    /// Serve the stored value and report the fallback to the audit sink.
    #[default]
    Fallback,
    /// Fail the whole view with [`RepositoryError::Integrity`].
    Strict,
}

/// Errors produced by the repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("record document must be a JSON object")]
    InvalidDocument,

    /// A sensitive field holds a number, boolean, object or array.
    #[error("sensitive field {path} must be a string or null")]
    NonStringField { path: String },

    /// A sensitive field holds ciphertext that no loaded key opens.
    #[error("field {path} holds ciphertext no loaded key can open: {reason}")]
    UnreadableCiphertext { path: String, reason: DecodeFailure },

    #[error("failed to encode field {path}: {source}")]
    Encoding {
        path: String,
        #[source]
        source: CodecError,
    },

    #[error("field {path} of record {id} could not be decoded: {reason}")]
    Integrity {
        id: Uuid,
        path: String,
        reason: DecodeFailure,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => ServiceError::NotFound(format!("record {id}")),
            RepositoryError::InvalidDocument | RepositoryError::NonStringField { .. } => {
                ServiceError::BadRequest(e.to_string())
            }
            RepositoryError::UnreadableCiphertext { .. } => ServiceError::Conflict(e.to_string()),
            RepositoryError::Encoding { .. } => ServiceError::EncryptionFailure(e.to_string()),
            RepositoryError::Integrity { .. } => ServiceError::IntegrityFailure(e.to_string()),
            RepositoryError::Store(StoreError::NotFound(id)) => {
                ServiceError::NotFound(format!("record {id}"))
            }
            RepositoryError::Store(StoreError::Conflict(id)) => {
                ServiceError::Conflict(format!("record {id}"))
            }
            RepositoryError::Store(StoreError::Unavailable(msg)) => ServiceError::Unavailable(msg),
        }
    }
}

/// A sensitive field served in its stored form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFallback {
    pub path: String,
    pub reason: DecodeFailure,
}

/// A record with its sensitive fields decoded.
#[derive(Debug, Clone)]
pub struct DecryptedView {
    /// The record as stored.
    pub record: StoredRecord,
    /// Copy of the document with decodable sensitive fields in plaintext.
    pub document: serde_json::Value,
    /// Fields left in their stored form.
    pub fallbacks: Vec<FieldFallback>,
}

/// Encode-on-write, decode-on-read access to stored records.
///
/// Cheap to clone; every dependency is `Arc`-shared.
#[derive(Clone)]
pub struct RecordRepository {
    store: Arc<dyn RecordStore>,
    cipher: Arc<CipherContext>,
    policy: Arc<FieldPolicy>,
    audit: Arc<dyn AuditSink>,
    decode_policy: DecodeFailurePolicy,
}

impl RecordRepository {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cipher: Arc<CipherContext>,
        policy: Arc<FieldPolicy>,
        audit: Arc<dyn AuditSink>,
        decode_policy: DecodeFailurePolicy,
    ) -> Self {
        Self {
            store,
            cipher,
            policy,
            audit,
            decode_policy,
        }
    }

    pub fn cipher(&self) -> &CipherContext {
        &self.cipher
    }

    /// Number of records in the store.
    pub fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.store.count()?)
    }

    /// Encode every sensitive field of `document` and persist it as a new `v1` record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidDocument`] if `document` is not an
    /// object and [`RepositoryError::Encoding`] if a field cannot be encoded;
    /// nothing is persisted in either case.
    pub fn create(
        &self,
        kind: RecordKind,
        document: serde_json::Value,
    ) -> Result<StoredRecord, RepositoryError> {
        let mut document = ensure_object(document)?;
        self.seal_fields(kind, &mut document)?;

        let now = Utc::now();
        let record = StoredRecord {
            id: Uuid::new_v4(),
            kind,
            format: FormatVersion::V1,
            key_id: Some(self.cipher.active_key_id().clone()),
            document,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone())?;
        info!(record_id = %record.id, kind = %kind, "record created");
        Ok(record)
    }

    /// Replace the document of an existing record.
    ///
    /// Sensitive values that are already encoded under the active key are
    /// stored unchanged, so saving a document read back from [`get`](Self::get)
    /// never double-encodes. Values under a retired key are re-encoded under
    /// the active one; everything else is treated as new plaintext. The record
    /// is `v1` afterwards, whatever its format before.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnreadableCiphertext`] if a sensitive value
    /// is shaped like an encoded value but no loaded key opens it; it is
    /// never wrapped in a second layer of encryption.
    pub fn update(
        &self,
        id: Uuid,
        document: serde_json::Value,
    ) -> Result<StoredRecord, RepositoryError> {
        let existing = self.get(id)?;
        let mut document = ensure_object(document)?;
        self.seal_fields(existing.kind, &mut document)?;

        let record = StoredRecord {
            format: FormatVersion::V1,
            key_id: Some(self.cipher.active_key_id().clone()),
            document,
            updated_at: Utc::now(),
            ..existing
        };
        self.store.replace(record.clone())?;
        info!(record_id = %record.id, kind = %record.kind, "record updated");
        Ok(record)
    }

    /// Persist `document` as a legacy record, without encoding anything.
    ///
    /// Models data written before field encryption existed.
    pub fn import_legacy(
        &self,
        kind: RecordKind,
        document: serde_json::Value,
    ) -> Result<StoredRecord, RepositoryError> {
        let document = ensure_object(document)?;
        let now = Utc::now();
        let record = StoredRecord {
            id: Uuid::new_v4(),
            kind,
            format: FormatVersion::Legacy,
            key_id: None,
            document,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone())?;
        info!(record_id = %record.id, kind = %kind, "legacy record imported");
        Ok(record)
    }

    /// Fetch a record exactly as stored.
    pub fn get(&self, id: Uuid) -> Result<StoredRecord, RepositoryError> {
        self.store.get(id)?.ok_or(RepositoryError::NotFound(id))
    }

    /// All stored records of `kind`.
    pub fn list(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, RepositoryError> {
        Ok(self.store.list(Some(kind))?)
    }

    /// Decode one stored sensitive value of `record`.
    ///
    /// This is the per-field result behind [`decrypted_view`](Self::decrypted_view);
    /// callers that need to tell legacy data from corruption use it directly.
    pub fn decode_field(&self, record: &StoredRecord, raw: &str) -> Result<String, DecodeFailure> {
        let opened = match FieldValue::classify(raw, record)? {
            FieldValue::Plain(plain) => return Ok(plain),
            FieldValue::Encoded {
                key_id: Some(id),
                value,
            } => self.cipher.open_with(&id, &value),
            FieldValue::Encoded {
                key_id: None,
                value,
            } => self.cipher.open_any(&value).map(|(_, plain)| plain),
        };
        opened.map_err(|e| e.decode_failure().unwrap_or(DecodeFailure::Cipher))
    }

    /// Fetch a record and decode its sensitive fields.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Integrity`] only under
    /// [`DecodeFailurePolicy::Strict`], for a `v1` field that fails to decode.
    /// Otherwise failed fields keep their stored value, are listed in
    /// [`DecryptedView::fallbacks`] and reported to the audit sink.
    pub fn decrypted_view(&self, id: Uuid) -> Result<DecryptedView, RepositoryError> {
        let record = self.get(id)?;
        let mut document = record.document.clone();
        let mut fallbacks = Vec::new();

        for path in self.policy.paths(record.kind) {
            for_each_string(&mut document, path, |raw| {
                match self.decode_field(&record, raw) {
                    Ok(plain) => *raw = plain,
                    Err(reason) => {
                        if record.format == FormatVersion::V1
                            && self.decode_policy == DecodeFailurePolicy::Strict
                        {
                            return Err(RepositoryError::Integrity {
                                id: record.id,
                                path: path.clone(),
                                reason,
                            });
                        }
                        self.audit.record_fallback(&FallbackEvent {
                            record_id: record.id,
                            kind: record.kind,
                            format: record.format,
                            path: path.clone(),
                            reason,
                        });
                        fallbacks.push(FieldFallback {
                            path: path.clone(),
                            reason,
                        });
                    }
                }
                Ok(())
            })?;
        }

        debug!(record_id = %record.id, fallbacks = fallbacks.len(), "decrypted view served");
        Ok(DecryptedView {
            record,
            document,
            fallbacks,
        })
    }

    /// Move every record onto the active key.
    ///
    /// `v1` records under a retired key are re-encoded; legacy records are
    /// upgraded to `v1`. A record with any field that cannot be decoded is
    /// left exactly as it was and listed in `failed`.
    ///
    /// # Errors
    ///
    /// Store failures and encoding failures abort the job; records already
    /// rewritten stay rewritten.
    pub fn reencrypt_all(&self) -> Result<ReencryptResponse, RepositoryError> {
        let mut report = ReencryptResponse::default();

        for record in self.store.list(None)? {
            report.scanned += 1;
            self.reencrypt_record(record, &mut report)?;
        }

        info!(
            scanned = report.scanned,
            reencrypted = report.reencrypted,
            upgraded_legacy = report.upgraded_legacy,
            failed = report.failed.len(),
            key_id = %self.cipher.active_key_id(),
            "re-encryption finished"
        );
        Ok(report)
    }

    /// Move one record onto the active key.
    ///
    /// The write only lands if the record is unchanged since it was read; a
    /// concurrent update is re-read and the record reconsidered.
    fn reencrypt_record(
        &self,
        mut record: StoredRecord,
        report: &mut ReencryptResponse,
    ) -> Result<(), RepositoryError> {
        let active = self.cipher.active_key_id();

        for _ in 0..REENCRYPT_ATTEMPTS {
            if record.format == FormatVersion::V1 && record.key_id.as_ref() == Some(active) {
                report.skipped += 1;
                return Ok(());
            }

            let was_legacy = record.format == FormatVersion::Legacy;
            let updated = match self.reseal(&record) {
                Ok(updated) => updated,
                Err(RepositoryError::Integrity { id, path, reason }) => {
                    warn!(
                        record_id = %id,
                        path = %path,
                        reason = reason.as_str(),
                        "record left on its current key"
                    );
                    report.failed.push(id);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            if self.store.replace_if_unchanged(updated, record.updated_at)? {
                if was_legacy {
                    report.upgraded_legacy += 1;
                } else {
                    report.reencrypted += 1;
                }
                return Ok(());
            }

            debug!(record_id = %record.id, "record changed during re-encryption, re-reading");
            record = self.get(record.id)?;
        }

        warn!(record_id = %record.id, "record kept changing during re-encryption");
        report.failed.push(record.id);
        Ok(())
    }

    /// Encode every sensitive string in `document` under the active key,
    /// leaving values already encoded under it untouched.
    ///
    /// `null` is stored as-is; any other non-string value is rejected so it
    /// never reaches the store in the clear.
    fn seal_fields(
        &self,
        kind: RecordKind,
        document: &mut serde_json::Value,
    ) -> Result<(), RepositoryError> {
        for path in self.policy.paths(kind) {
            for_each_leaf(document, path, |leaf| match leaf {
                serde_json::Value::Null => Ok(()),
                serde_json::Value::String(value) => self.seal(path, value),
                _ => Err(RepositoryError::NonStringField { path: path.clone() }),
            })?;
        }
        Ok(())
    }

    fn seal(&self, path: &str, value: &mut String) -> Result<(), RepositoryError> {
        if value.is_empty() {
            return Ok(());
        }
        let plain = match self.cipher.decode_any(value) {
            Ok((id, _)) if id == *self.cipher.active_key_id() => return Ok(()),
            Ok((_, plain)) => plain,
            // Text not shaped like an encoded value is new plaintext.
            Err(CodecError::Decoding(DecodeFailure::Format | DecodeFailure::Hex)) => value.clone(),
            Err(e) => {
                return Err(RepositoryError::UnreadableCiphertext {
                    path: path.to_owned(),
                    reason: e.decode_failure().unwrap_or(DecodeFailure::Cipher),
                })
            }
        };
        *value = self
            .cipher
            .encode(&plain)
            .map_err(|source| RepositoryError::Encoding {
                path: path.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Decode every sensitive field of `record` and encode it again under the
    /// active key, producing the `v1` replacement record.
    fn reseal(&self, record: &StoredRecord) -> Result<StoredRecord, RepositoryError> {
        let mut document = record.document.clone();
        for path in self.policy.paths(record.kind) {
            for_each_leaf(&mut document, path, |leaf| {
                let raw = match leaf {
                    serde_json::Value::Null => return Ok(()),
                    serde_json::Value::String(raw) => raw,
                    // Legacy data with a structured value here cannot be encoded as-is.
                    _ => {
                        return Err(RepositoryError::Integrity {
                            id: record.id,
                            path: path.clone(),
                            reason: DecodeFailure::Format,
                        })
                    }
                };
                if raw.is_empty() {
                    return Ok(());
                }
                let plain = match self.decode_field(record, raw) {
                    Ok(plain) => plain,
                    // Legacy text such as "Time: 5pm" is plaintext, not ciphertext.
                    Err(DecodeFailure::Format | DecodeFailure::Hex)
                        if record.format == FormatVersion::Legacy =>
                    {
                        raw.clone()
                    }
                    Err(reason) => {
                        return Err(RepositoryError::Integrity {
                            id: record.id,
                            path: path.clone(),
                            reason,
                        })
                    }
                };
                *raw = self
                    .cipher
                    .encode(&plain)
                    .map_err(|source| RepositoryError::Encoding {
                        path: path.clone(),
                        source,
                    })?;
                Ok(())
            })?;
        }

        Ok(StoredRecord {
            format: FormatVersion::V1,
            key_id: Some(self.cipher.active_key_id().clone()),
            document,
            updated_at: Utc::now(),
            ..record.clone()
        })
    }
}

fn ensure_object(document: serde_json::Value) -> Result<serde_json::Value, RepositoryError> {
    if document.is_object() {
        Ok(document)
    } else {
        Err(RepositoryError::InvalidDocument)
    }
}
