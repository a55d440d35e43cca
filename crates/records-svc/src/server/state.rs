//! Shared application state injected into every Axum handler.

use crate::records::RecordRepository;

/// Application state shared across all request handlers.
///
/// Cloned per request; the repository is `Arc`-backed throughout.
#[derive(Clone)]
pub struct AppState {
    /// Encode-on-write, decode-on-read access to records.
    pub repository: RecordRepository,
}

impl AppState {
    pub fn new(repository: RecordRepository) -> Self {
        Self { repository }
    }
}

#[cfg(test)]
impl Default for AppState {
    /// In-memory store, test key material and the default field policy.
    fn default() -> Self {
        Self::new(crate::records::repository::tests::test_repository())
    }
}
