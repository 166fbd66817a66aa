//! Integration tests for the SheetGate admin HTTP surface.
//!
//! Exercises the router end to end via `tower::ServiceExt::oneshot`
//! against a fully wired `AppState<FakeDocumentClient>`, the way
//! `FakeDocumentClient` is meant to be used outside `sheetgate-core`'s own
//! unit tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sheetgate_api::routes::build_router;
use sheetgate_api::{AppConfig, AppState};
use sheetgate_core::document_client::fake::FakeDocumentClient;
use sheetgate_core::{TenantAttrs, TenantRegistry};
use tower::ServiceExt;

fn test_state() -> AppState<FakeDocumentClient> {
    let registry = TenantRegistry::new();
    registry
        .add_or_update(
            "t1",
            TenantAttrs {
                sheet_ref: Some("sheet-1".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    let client = Arc::new(FakeDocumentClient::new());
    let mut config = AppConfig::from_env();
    config.signing_key = None;
    AppState::new(registry, client, config)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = build_router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn pool_stats_reports_zero_on_a_fresh_process() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/pool/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn rate_limit_snapshot_missing_tenant_is_404() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/pool/rate-limit/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cache_tenant_endpoint_reports_zero_for_unknown_tenant() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/cache/tenant/nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["entries"], 0);
}

#[tokio::test]
async fn batch_flush_without_signature_succeeds_when_signing_disabled() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/batch/flush")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_metrics_is_prometheus_text_format() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sheetgate_pool_connections_total"));
}
