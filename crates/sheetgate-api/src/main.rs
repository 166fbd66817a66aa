use std::sync::Arc;

use sheetgate_api::routes::build_router;
use sheetgate_api::{AppConfig, AppState};
use sheetgate_core::document_client::fake::FakeDocumentClient;
use sheetgate_core::TenantRegistry;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    if let Err(reason) = config.validate() {
        tracing::error!(%reason, "invalid configuration, refusing to start");
        std::process::exit(1);
    }
    if config.signing_key.is_none() {
        tracing::warn!(
            "SHEETGATE_ADMIN_SIGNING_KEY not set; mutating admin endpoints are unsigned"
        );
    }

    let registry = TenantRegistry::new();
    let client = Arc::new(FakeDocumentClient::new());
    let state = AppState::new(registry, client, config);
    let _background_tasks = state.start_background_tasks();

    let app = build_router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));

    tracing::info!(%addr, "sheetgate-api listening");
    axum::serve(listener, app)
        .await
        .expect("server error");
}
