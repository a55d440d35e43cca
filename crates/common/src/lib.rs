//! Common types, protocol definitions, and errors shared across the records service crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
