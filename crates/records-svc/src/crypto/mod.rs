//! AES-256-CBC field encoding primitives.
//!
//! This module is intentionally free of storage and HTTP dependencies.
//! It provides the low-level encode/decode operations used by the key and
//! records layers.
//!
//! # Stored format
//!
//! ```text
//! <hex(iv)>:<hex(ciphertext)>
//! ```
//!
//! The format carries no version or key identifier; both live on the owning
//! record (`format` and `key_id`).

pub mod codec;

pub use codec::{
    decode, encode, looks_encoded, open, CodecError, DecodeFailure, EncodedValue, KEY_LEN,
};
