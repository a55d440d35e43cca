//! Axum router construction.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    build_with_timeout(state, middleware::REQUEST_TIMEOUT)
}

fn build_with_timeout(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route(
            "/records/:kind",
            post(handlers::create_record).get(handlers::list_records),
        )
        .route("/records/:kind/legacy", post(handlers::import_legacy))
        .route(
            "/record/:id",
            get(handlers::get_record).put(handlers::update_record),
        )
        .route("/record/:id/decrypted", get(handlers::get_decrypted))
        .route(
            "/patients/:id/glucose-summary",
            get(handlers::glucose_summary),
        )
        .route("/health", get(handlers::health))
        .layer(TimeoutLayer::new(timeout))
        // Added after the timeout layer: a timed-out caller would lose the
        // report while the pass kept running on the blocking pool.
        .route("/maintenance/reencrypt", post(handlers::reencrypt))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn health_route_exists() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let app = build(AppState::default());
        let req = Request::builder()
            .method("DELETE")
            .uri("/records/patient")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 405);
    }

    #[tokio::test]
    async fn reencrypt_requires_post() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/maintenance/reencrypt")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 405);
    }

    #[tokio::test]
    async fn reencrypt_outlives_request_timeout() {
        use crate::audit::TracingAuditSink;
        use crate::keys::tests::test_context;
        use crate::records::store::MockRecordStore;
        use crate::records::{DecodeFailurePolicy, FieldPolicy, RecordRepository};
        use std::sync::Arc;

        let mut store = MockRecordStore::new();
        store.expect_list().returning(|_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Vec::new())
        });
        let repository = RecordRepository::new(
            Arc::new(store),
            Arc::new(test_context()),
            Arc::new(FieldPolicy::default()),
            Arc::new(TracingAuditSink),
            DecodeFailurePolicy::Fallback,
        );

        let app = build_with_timeout(AppState::new(repository), Duration::from_millis(20));
        let req = Request::builder()
            .method("POST")
            .uri("/maintenance/reencrypt")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
    }
}
