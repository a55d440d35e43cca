//! Process-wide cipher context: the active field key plus any retired keys.
//!
//! # Lifecycle
//!
//! 1. At startup, [`CipherContext::from_secrets`] parses `ENCRYPTION_KEY` and
//!    `RETIRED_KEYS`. A missing or malformed key aborts startup.
//! 2. The context is wrapped in an `Arc` and injected into the repository and
//!    handlers. It is never mutated afterwards.
//! 3. New values are always encoded under the active key. Retired keys are
//!    decode-only and exist so `reencrypt_all` can move old records forward.
//!
//! # Security invariants
//!
//! - Key material is never logged; [`CipherKey`] redacts itself in `Debug`.
//! - Key ids are labels, not secrets, and may appear in logs and records.

pub mod key;

pub use key::CipherKey;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{self, CodecError, DecodeFailure, EncodedValue};

/// Label identifying which key a record's fields are encoded under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable set of field keys shared by every component that encodes or
/// decodes sensitive fields.
#[derive(Debug)]
pub struct CipherContext {
    active_id: KeyId,
    active: CipherKey,
    retired: Vec<(KeyId, CipherKey)>,
}

impl CipherContext {
    /// Create a context with a single active key.
    pub fn new(active_id: KeyId, active: CipherKey) -> Self {
        Self {
            active_id,
            active,
            retired: Vec::new(),
        }
    }

    /// Add a decode-only key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if `id` is already registered.
    pub fn with_retired(mut self, id: KeyId, key: CipherKey) -> Result<Self, CodecError> {
        if self.knows(&id) {
            return Err(CodecError::Configuration(format!("duplicate key id: {id}")));
        }
        self.retired.push((id, key));
        Ok(self)
    }

    /// Build a context from the configured secrets.
    ///
    /// `retired` is a `;`-separated list of `id=hex` pairs; blank means none.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if any key is missing or malformed.
    pub fn from_secrets(active_id: &str, active_hex: &str, retired: &str) -> Result<Self, CodecError> {
        let active_id = active_id.trim();
        if active_id.is_empty() {
            return Err(CodecError::Configuration("active key id is empty".into()));
        }
        let mut ctx = Self::new(KeyId::new(active_id), CipherKey::from_hex(active_hex)?);

        for entry in retired.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, hex_key) = entry.split_once('=').ok_or_else(|| {
                CodecError::Configuration("retired keys must be written as id=hex".into())
            })?;
            let id = id.trim();
            if id.is_empty() {
                return Err(CodecError::Configuration("retired key id is empty".into()));
            }
            ctx = ctx.with_retired(KeyId::new(id), CipherKey::from_hex(hex_key)?)?;
        }
        Ok(ctx)
    }

    /// Id of the key new values are encoded under.
    pub fn active_key_id(&self) -> &KeyId {
        &self.active_id
    }

    /// Number of retired keys available for decoding.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Returns `true` if `id` is the active key or a retired key.
    pub fn knows(&self, id: &KeyId) -> bool {
        self.key(id).is_ok()
    }

    /// Look up a key by id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if no key with that id is loaded.
    pub fn key(&self, id: &KeyId) -> Result<&CipherKey, CodecError> {
        if *id == self.active_id {
            return Ok(&self.active);
        }
        self.retired
            .iter()
            .find(|(rid, _)| rid == id)
            .map(|(_, key)| key)
            .ok_or_else(|| CodecError::Configuration(format!("no key loaded for id {id}")))
    }

    /// Encode `plaintext` under the active key.
    pub fn encode(&self, plaintext: &str) -> Result<String, CodecError> {
        crypto::encode(plaintext, self.active.as_bytes())
    }

    /// Decode `encoded` with the active key, then each retired key in turn.
    ///
    /// Returns the id of the key that succeeded alongside the plaintext.
    /// Structural failures (`Format`, `Hex`) do not depend on the key and are
    /// returned at once.
    pub fn decode_any(&self, encoded: &str) -> Result<(KeyId, String), CodecError> {
        let mut last = CodecError::Decoding(DecodeFailure::Cipher);
        for (id, key) in self.keys() {
            match crypto::decode(encoded, key.as_bytes()) {
                Ok(plain) => return Ok((id.clone(), plain)),
                Err(e @ CodecError::Decoding(DecodeFailure::Format | DecodeFailure::Hex)) => {
                    return Err(e)
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Open an already-parsed value under the key named `id`.
    ///
    /// An unknown key id is reported as a cipher failure: the value cannot be
    /// recovered with what this process holds.
    pub fn open_with(&self, id: &KeyId, value: &EncodedValue) -> Result<String, CodecError> {
        let key = self
            .key(id)
            .map_err(|_| CodecError::Decoding(DecodeFailure::Cipher))?;
        crypto::open(value, key.as_bytes())
    }

    /// [`decode_any`](Self::decode_any) for an already-parsed value.
    pub fn open_any(&self, value: &EncodedValue) -> Result<(KeyId, String), CodecError> {
        let mut last = CodecError::Decoding(DecodeFailure::Cipher);
        for (id, key) in self.keys() {
            match crypto::open(value, key.as_bytes()) {
                Ok(plain) => return Ok((id.clone(), plain)),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    fn keys(&self) -> impl Iterator<Item = (&KeyId, &CipherKey)> {
        std::iter::once((&self.active_id, &self.active))
            .chain(self.retired.iter().map(|(id, key)| (id, key)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PRIMARY_HEX: &str =
        "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    pub(crate) const OLD_HEX: &str =
        "f0e0d0c0b0a090807060504030201000f1e1d1c1b1a191817161514131211101";

    pub(crate) fn test_context() -> CipherContext {
        CipherContext::from_secrets("primary", PRIMARY_HEX, "").unwrap()
    }

    #[test]
    fn from_secrets_single_key() {
        let ctx = test_context();
        assert_eq!(ctx.active_key_id().as_str(), "primary");
        assert_eq!(ctx.retired_count(), 0);
    }

    #[test]
    fn from_secrets_parses_retired_keys() {
        let ctx =
            CipherContext::from_secrets("k2", PRIMARY_HEX, &format!("k1={OLD_HEX}; ")).unwrap();
        assert_eq!(ctx.retired_count(), 1);
        assert!(ctx.knows(&KeyId::new("k1")));
        assert!(!ctx.knows(&KeyId::new("k0")));
    }

    #[test]
    fn missing_key_is_fatal() {
        assert!(matches!(
            CipherContext::from_secrets("primary", "", ""),
            Err(CodecError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_key_id_rejected() {
        let retired = format!("primary={OLD_HEX}");
        assert!(CipherContext::from_secrets("primary", PRIMARY_HEX, &retired).is_err());
    }

    #[test]
    fn malformed_retired_entry_rejected() {
        assert!(CipherContext::from_secrets("primary", PRIMARY_HEX, OLD_HEX).is_err());
    }

    #[test]
    fn open_with_named_key() {
        let ctx = test_context();
        let encoded: EncodedValue = ctx.encode("5551234567").unwrap().parse().unwrap();
        let plain = ctx.open_with(&KeyId::new("primary"), &encoded).unwrap();
        assert_eq!(plain, "5551234567");
    }

    #[test]
    fn open_with_unknown_key_is_cipher_failure() {
        let ctx = test_context();
        let encoded: EncodedValue = ctx.encode("5551234567").unwrap().parse().unwrap();
        let err = ctx.open_with(&KeyId::new("gone"), &encoded).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Cipher));
    }

    #[test]
    fn decode_any_finds_retired_key() {
        let old = CipherContext::from_secrets("k1", OLD_HEX, "").unwrap();
        let encoded = old.encode("Istanbul, Turkey").unwrap();

        let ctx =
            CipherContext::from_secrets("k2", PRIMARY_HEX, &format!("k1={OLD_HEX}")).unwrap();
        let (id, plain) = ctx.decode_any(&encoded).unwrap();
        assert_eq!(id.as_str(), "k1");
        assert_eq!(plain, "Istanbul, Turkey");
    }

    #[test]
    fn decode_any_reports_structural_failure() {
        let ctx = test_context();
        let err = ctx.decode_any("not-valid-hex:also-not-valid").unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Hex));
    }

    #[test]
    fn decode_any_without_matching_key_is_cipher_failure() {
        let orphan = CipherContext::from_secrets("k1", OLD_HEX, "")
            .unwrap()
            .encode("5551234567")
            .unwrap();
        let err = test_context().decode_any(&orphan).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Cipher));
    }
}
