//! AES-256-CBC encoding and decoding of individual sensitive string fields.
//!
//! **Format:** `<hex(iv)>:<hex(ciphertext)>`, lowercase hex, PKCS#7 padding.
//! A fresh 16-byte IV is drawn from the OS CSPRNG for every call, so encoding
//! the same plaintext twice never yields the same stored value.
//!
//! CBC carries no authentication tag. Tampering is only detected when it
//! breaks the padding or the UTF-8 of the recovered plaintext, so callers must
//! not treat a successful decode as proof of integrity.

use std::fmt;
use std::str::FromStr;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of a CBC initialisation vector (one AES block).
pub const IV_LEN: usize = 16;

/// Separator between the IV and ciphertext components.
pub const SEPARATOR: char = ':';

/// Why a stored value could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Not two components, wrong IV length, or ciphertext not a whole number of blocks.
    Format,
    /// A component is not valid hex.
    Hex,
    /// Decryption or padding validation failed (wrong key, corruption, truncation).
    Cipher,
    /// Decrypted bytes are not valid UTF-8.
    Utf8,
}

impl DecodeFailure {
    /// Short machine-readable label, safe to log.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeFailure::Format => "format",
            DecodeFailure::Hex => "hex",
            DecodeFailure::Cipher => "cipher",
            DecodeFailure::Utf8 => "utf8",
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the codec layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No usable encryption key is configured.
    #[error("encryption key not configured: {0}")]
    Configuration(String),

    /// Cipher setup or encryption failed.
    #[error("field encoding failed")]
    Encoding,

    /// The stored value could not be decoded.
    #[error("field decoding failed: {0}")]
    Decoding(DecodeFailure),
}

impl CodecError {
    /// The decode failure reason, if this is a decoding error.
    pub fn decode_failure(&self) -> Option<DecodeFailure> {
        match self {
            CodecError::Decoding(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// A parsed encoded field value.
///
/// The string representation is `<hex(iv)>:<hex(ciphertext)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    /// Raw IV bytes.
    pub iv: [u8; IV_LEN],
    /// Raw ciphertext bytes, a non-zero multiple of the block size.
    pub ciphertext: Vec<u8>,
}

impl fmt::Display for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            hex::encode(self.iv),
            SEPARATOR,
            hex::encode(&self.ciphertext)
        )
    }
}

impl FromStr for EncodedValue {
    type Err = DecodeFailure;

    /// Split on the first separator and hex-decode both halves.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (iv_hex, ct_hex) = s.split_once(SEPARATOR).ok_or(DecodeFailure::Format)?;
        let iv_bytes = hex::decode(iv_hex).map_err(|_| DecodeFailure::Hex)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| DecodeFailure::Hex)?;

        if iv_bytes.len() != IV_LEN {
            return Err(DecodeFailure::Format);
        }
        if ciphertext.is_empty() || ciphertext.len() % IV_LEN != 0 {
            return Err(DecodeFailure::Format);
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&iv_bytes);
        Ok(Self { iv, ciphertext })
    }
}

/// Heuristic: does this stored value look like it went through [`encode`]?
///
/// True iff the value contains the separator. Plaintext that happens to
/// contain a colon (`"Time: 5pm"`) is a false positive; correctly encoded
/// values are never missed. Only consulted for records in the legacy format.
pub fn looks_encoded(value: &str) -> bool {
    value.contains(SEPARATOR)
}

/// Encode a plaintext string field under `key`.
///
/// An empty plaintext is returned unchanged.
///
/// # Errors
///
/// Returns [`CodecError::Configuration`] if `key` is empty and
/// [`CodecError::Encoding`] if it is not [`KEY_LEN`] bytes.
pub fn encode(plaintext: &str, key: &[u8]) -> Result<String, CodecError> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    Ok(encrypt_with_iv(plaintext.as_bytes(), key, iv)?.to_string())
}

/// Decode a stored `<hex(iv)>:<hex(ciphertext)>` value back to plaintext.
///
/// # Errors
///
/// Every failure (format, hex, padding, UTF-8, unusable key) is reported as
/// [`CodecError::Decoding`].
pub fn decode(encoded: &str, key: &[u8]) -> Result<String, CodecError> {
    let value = EncodedValue::from_str(encoded).map_err(CodecError::Decoding)?;
    open(&value, key)
}

/// Decrypt an already-parsed [`EncodedValue`] and validate the plaintext as UTF-8.
///
/// # Errors
///
/// [`DecodeFailure::Cipher`] for a wrong key or bad padding,
/// [`DecodeFailure::Utf8`] if the decrypted bytes are not text.
pub fn open(value: &EncodedValue, key: &[u8]) -> Result<String, CodecError> {
    let cipher = Aes256CbcDec::new_from_slices(key, &value.iv)
        .map_err(|_| CodecError::Decoding(DecodeFailure::Cipher))?;
    let bytes = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&value.ciphertext)
        .map_err(|_| CodecError::Decoding(DecodeFailure::Cipher))?;
    String::from_utf8(bytes).map_err(|_| CodecError::Decoding(DecodeFailure::Utf8))
}

fn encrypt_with_iv(plaintext: &[u8], key: &[u8], iv: [u8; IV_LEN]) -> Result<EncodedValue, CodecError> {
    if key.is_empty() {
        return Err(CodecError::Configuration("no encryption key supplied".into()));
    }
    if key.len() != KEY_LEN {
        return Err(CodecError::Encoding);
    }
    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CodecError::Encoding)?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Ok(EncodedValue { iv, ciphertext })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    fn is_lower_hex_pair(s: &str) -> bool {
        let Some((iv, ct)) = s.split_once(':') else {
            return false;
        };
        let lower_hex = |p: &str| {
            !p.is_empty() && p.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        };
        lower_hex(iv) && lower_hex(ct)
    }

    #[test]
    fn identity_number_round_trip() {
        let key = random_key();
        let encoded = encode("90123456789", &key).unwrap();
        assert!(is_lower_hex_pair(&encoded), "unexpected format: {encoded}");
        assert_eq!(decode(&encoded, &key).unwrap(), "90123456789");
    }

    #[test]
    fn same_plaintext_encodes_differently() {
        let key = random_key();
        let a = encode("Istanbul, Turkey", &key).unwrap();
        let b = encode("Istanbul, Turkey", &key).unwrap();
        assert_ne!(a, b);
        assert_eq!(decode(&a, &key).unwrap(), "Istanbul, Turkey");
        assert_eq!(decode(&b, &key).unwrap(), "Istanbul, Turkey");
    }

    #[test]
    fn multibyte_plaintext_round_trip() {
        let key = random_key();
        let note = "Şeker düşük, 3 ünite insülin yapıldı";
        let encoded = encode(note, &key).unwrap();
        assert_eq!(decode(&encoded, &key).unwrap(), note);
    }

    #[test]
    fn block_aligned_plaintext_gets_full_padding_block() {
        let key = random_key();
        let encoded = encode("0123456789abcdef", &key).unwrap();
        let value: EncodedValue = encoded.parse().unwrap();
        assert_eq!(value.ciphertext.len(), 2 * IV_LEN);
    }

    #[test]
    fn empty_plaintext_passes_through() {
        let key = random_key();
        assert_eq!(encode("", &key).unwrap(), "");
    }

    #[test]
    fn missing_key_is_configuration_error() {
        assert!(matches!(encode("x", &[]), Err(CodecError::Configuration(_))));
    }

    #[test]
    fn short_key_is_encoding_error() {
        assert!(matches!(encode("x", &[0u8; 16]), Err(CodecError::Encoding)));
    }

    #[test]
    fn looks_encoded_uses_colon() {
        assert!(!looks_encoded("5551234567"));
        assert!(looks_encoded("a1b2c3:d4e5f6"));
        assert!(looks_encoded("Time: 5pm"));
    }

    #[test]
    fn invalid_hex_is_decoding_error() {
        let key = random_key();
        let err = decode("not-valid-hex:also-not-valid", &key).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Hex));
    }

    #[test]
    fn missing_separator_is_format_error() {
        let key = random_key();
        let err = decode("00112233", &key).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Format));
    }

    #[test]
    fn short_iv_is_format_error() {
        let key = random_key();
        let err = decode("a1b2c3:d4e5f6", &key).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Format));
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let key = random_key();
        let encoded = encode("a note long enough to span two blocks", &key).unwrap();
        let truncated = &encoded[..encoded.len() - 2];
        assert!(matches!(decode(truncated, &key), Err(CodecError::Decoding(_))));
    }

    #[test]
    fn wrong_key_fails_decoding() {
        let encoded = encode("secret", &random_key()).unwrap();
        assert!(decode(&encoded, &random_key()).is_err());
    }

    #[test]
    fn display_and_parse_agree() {
        let key = random_key();
        let encoded = encode("hello", &key).unwrap();
        let parsed: EncodedValue = encoded.parse().unwrap();
        assert_eq!(parsed.to_string(), encoded);
    }
}
