//! Record model, sensitive-field policy, persistence seam and repository.
//!
//! # Responsibilities
//!
//! - Describe the persisted record shape and its storage format tag.
//! - Declare which fields of each record kind are sensitive.
//! - Encode sensitive fields on write and decode them on explicit read.
//!
//! # Module invariants
//!
//! - Only [`RecordRepository`] touches the cipher. [`RecordStore`]
//!   implementations receive and return records in stored form.
//! - Plaintext of a sensitive field is never logged.

pub mod model;
pub mod path;
pub mod policy;
pub mod repository;
pub mod store;

pub use model::{FormatVersion, RecordKind, StoredRecord};
pub use policy::FieldPolicy;
pub use repository::{DecodeFailurePolicy, DecryptedView, RecordRepository, RepositoryError};
pub use store::{MemoryStore, RecordStore};
