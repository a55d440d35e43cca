//! [`CipherKey`]: fixed-size key buffer for field encoding.

use crate::crypto::{CodecError, KEY_LEN};

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which key material lives in RAM.
#[derive(Clone)]
pub struct CipherKey(Box<[u8; KEY_LEN]>);

impl CipherKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != KEY_LEN {
            return Err(CodecError::Configuration(format!(
                "expected {KEY_LEN} key bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Parse a key from its 64-character hex form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if the secret is empty, not hex,
    /// or does not decode to exactly [`KEY_LEN`] bytes.
    pub fn from_hex(secret: &str) -> Result<Self, CodecError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CodecError::Configuration("encryption key is empty".into()));
        }
        let mut bytes = hex::decode(secret)
            .map_err(|_| CodecError::Configuration("encryption key is not valid hex".into()))?;
        let key = Self::from_bytes(&bytes);
        bytes.iter_mut().for_each(|b| *b = 0);
        key
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("CipherKey([REDACTED])")
    }
}
