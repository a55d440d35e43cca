//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Conflict`] → 409
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::IntegrityFailure`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed — unknown record kind, invalid id, or invalid JSON.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same identifier already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Encoding a sensitive field failed; the record was not persisted.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// A stored encrypted field could not be decoded and strict decoding is enabled.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    /// The backing store is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::IntegrityFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::IntegrityFailure(_) => "integrity_failure",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ServiceError::Conflict("x".into()).http_status(), 409);
        assert_eq!(
            ServiceError::EncryptionFailure("x".into()).http_status(),
            500
        );
        assert_eq!(
            ServiceError::IntegrityFailure("x".into()).http_status(),
            500
        );
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(ServiceError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            ServiceError::Unavailable("x".into()).code(),
            "service_unavailable"
        );
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::BadRequest("unknown record kind: nurse".into());
        assert!(e.to_string().contains("unknown record kind: nurse"));
    }
}
