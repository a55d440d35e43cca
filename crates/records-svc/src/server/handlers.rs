//! Axum request handlers for all service endpoints.
//!
//! Handlers parse path parameters themselves so that malformed ids and kinds
//! produce the same JSON error body as every other failure.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    DecryptedRecordResponse, ErrorResponse, FieldFallbackResponse, GlucoseSummaryResponse,
    HealthResponse, ReencryptResponse, RecordListResponse, RecordResponse, WriteRecordRequest,
};
use common::ServiceError;
use tracing::{error, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::analytics;
use crate::records::{DecryptedView, RecordKind, RepositoryError};

/// Error returned by handlers, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed");
        }
        let message = match &self.0 {
            // Encoding failures carry codec detail that callers have no use for.
            ServiceError::EncryptionFailure(_) => "failed to encrypt a sensitive field".to_owned(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse::new(self.0.code(), message))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_kind(raw: &str) -> Result<RecordKind, ApiError> {
    raw.parse()
        .map_err(|e: String| ServiceError::BadRequest(e).into())
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::BadRequest(format!("invalid record id: {raw}")).into())
}

/// `POST /records/:kind` — encode sensitive fields and store a new record.
pub async fn create_record(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(req): Json<WriteRecordRequest>,
) -> ApiResult<(StatusCode, Json<RecordResponse>)> {
    let kind = parse_kind(&kind)?;
    let record = state.repository.create(kind, req.document)?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// `POST /records/:kind/legacy` — store a record as it would have been
/// written before field encryption.
pub async fn import_legacy(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(req): Json<WriteRecordRequest>,
) -> ApiResult<(StatusCode, Json<RecordResponse>)> {
    let kind = parse_kind(&kind)?;
    let record = state.repository.import_legacy(kind, req.document)?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// `GET /records/:kind` — list stored records of one kind, as stored.
pub async fn list_records(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<RecordListResponse>> {
    let kind = parse_kind(&kind)?;
    let records = state
        .repository
        .list(kind)?
        .into_iter()
        .map(RecordResponse::from)
        .collect();
    Ok(Json(RecordListResponse { records }))
}

/// `GET /record/:id` — one record as stored.
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RecordResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(state.repository.get(id)?.into()))
}

/// `PUT /record/:id` — replace a record's document.
pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WriteRecordRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(state.repository.update(id, req.document)?.into()))
}

/// `GET /record/:id/decrypted` — the record with sensitive fields decoded.
pub async fn get_decrypted(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DecryptedRecordResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(state.repository.decrypted_view(id)?.into()))
}

impl From<DecryptedView> for DecryptedRecordResponse {
    fn from(view: DecryptedView) -> Self {
        Self {
            id: view.record.id,
            kind: view.record.kind.to_string(),
            document: view.document,
            fallbacks: view
                .fallbacks
                .into_iter()
                .map(|f| FieldFallbackResponse {
                    path: f.path,
                    reason: f.reason.as_str().to_owned(),
                })
                .collect(),
        }
    }
}

/// `GET /patients/:id/glucose-summary` — time-in-range statistics.
pub async fn glucose_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GlucoseSummaryResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(analytics::patient_summary(&state.repository, id)?))
}

/// `POST /maintenance/reencrypt` — move every record onto the active key.
///
/// Runs on the blocking pool; the pass touches every record in the store.
/// The route is exempt from the request timeout so the caller always
/// receives the report.
pub async fn reencrypt(State(state): State<AppState>) -> ApiResult<Json<ReencryptResponse>> {
    let repository = state.repository.clone();
    let report = tokio::task::spawn_blocking(move || repository.reencrypt_all())
        .await
        .map_err(|e| {
            error!(error = %e, "re-encryption task panicked");
            ServiceError::Internal("re-encryption task failed".into())
        })??;
    Ok(Json(report))
}

/// `GET /health` — liveness and readiness check.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let active_key_id = state.repository.cipher().active_key_id().to_string();
    let (status_code, status, records_stored) = match state.repository.count() {
        Ok(n) => (StatusCode::OK, "ok", n),
        Err(e) => {
            warn!(error = %e, "health check: store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", 0)
        }
    };

    let body = HealthResponse {
        status: status.into(),
        active_key_id,
        records_stored,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
