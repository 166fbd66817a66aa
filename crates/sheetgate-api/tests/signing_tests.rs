//! Signature enforcement on mutating admin endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sheetgate_api::routes::build_router;
use sheetgate_api::signing::SigningKey;
use sheetgate_api::{AppConfig, AppState};
use sheetgate_core::document_client::fake::FakeDocumentClient;
use sheetgate_core::TenantRegistry;
use tower::ServiceExt;

fn signed_state() -> (AppState<FakeDocumentClient>, SigningKey) {
    let key = SigningKey::new(b"test-secret".to_vec());
    let registry = TenantRegistry::new();
    let client = Arc::new(FakeDocumentClient::new());
    let mut config = AppConfig::from_env();
    config.signing_key = Some(key.clone());
    (AppState::new(registry, client, config), key)
}

#[tokio::test]
async fn delete_cache_tenant_without_signature_is_forbidden() {
    let (state, _key) = signed_state();
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/cache/tenant/t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_cache_tenant_with_valid_signature_succeeds() {
    let (state, key) = signed_state();
    let sig = key.sign("DELETE", "t1", "cache.invalidate_tenant", "nonce-1");
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/cache/tenant/t1")
                .header("x-sheetgate-nonce", "nonce-1")
                .header("x-sheetgate-signature", sig)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
