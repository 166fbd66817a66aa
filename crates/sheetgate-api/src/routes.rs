//! The health/admin/metrics HTTP surface.
//!
//! There is no business (row-read/row-write) surface here; those endpoints
//! belong to whatever product embeds SheetGate as a library. This crate
//! only exposes SheetGate's own operability endpoints, per the external
//! interfaces list.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sheetgate_core::DocumentClient;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error_response::forbidden;
use crate::metrics;
use crate::state::AppState;

pub fn build_router<C: DocumentClient + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/pool/stats", get(pool_stats::<C>))
        .route(
            "/admin/pool/rate-limit/{tenant_id}",
            get(pool_rate_limit::<C>),
        )
        .route("/admin/batch/stats", get(batch_stats::<C>))
        .route("/admin/batch/flush", post(batch_flush::<C>))
        .route("/admin/cache/stats", get(cache_stats::<C>))
        .route("/admin/cache/tenant/{tenant_id}", get(cache_tenant::<C>))
        .route(
            "/admin/cache/tenant/{tenant_id}",
            delete(cache_tenant_invalidate::<C>),
        )
        .route("/admin/metrics", get(admin_metrics::<C>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Headers carrying the HMAC signature for a mutating admin call.
struct SignatureHeaders {
    nonce: String,
    signature: String,
}

fn extract_signature(headers: &HeaderMap) -> Option<SignatureHeaders> {
    let nonce = headers.get("x-sheetgate-nonce")?.to_str().ok()?.to_string();
    let signature = headers
        .get("x-sheetgate-signature")?
        .to_str()
        .ok()?
        .to_string();
    Some(SignatureHeaders { nonce, signature })
}

/// Verify a mutating request's signature, if a signing key is configured.
/// An unconfigured key means admin signing is deliberately disabled (e.g.
/// local development) -- the binary startup path logs a warning in that
/// case (see `main.rs`) so it's not a silent gap in a deployed environment.
fn check_signature<C: DocumentClient + 'static>(
    state: &AppState<C>,
    headers: &HeaderMap,
    method: &str,
    tenant_id: &str,
    action: &str,
) -> Result<(), Response> {
    let Some(key) = &state.config.signing_key else {
        return Ok(());
    };

    let Some(sig) = extract_signature(headers) else {
        return Err(forbidden("missing signature headers"));
    };

    if key.verify(method, tenant_id, action, &sig.nonce, &sig.signature) {
        Ok(())
    } else {
        Err(forbidden("invalid signature"))
    }
}

async fn pool_stats<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<sheetgate_pool::PoolStats> {
    Json(state.pool.stats().await)
}

#[derive(Serialize)]
struct RateLimitSnapshot {
    tenant_id: String,
    tokens: f64,
    capacity: f64,
}

async fn pool_rate_limit<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<RateLimitSnapshot>, StatusCode> {
    match state.pool.rate_limit_snapshot(&tenant_id) {
        Some((tokens, capacity)) => Ok(Json(RateLimitSnapshot {
            tenant_id,
            tokens,
            capacity,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn batch_stats<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<sheetgate_batch::BatchStats> {
    Json(state.batch.stats())
}

#[derive(Deserialize, Default)]
struct FlushRequest {
    tenant_id: Option<String>,
}

async fn batch_flush<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    body: Option<Json<FlushRequest>>,
) -> Response {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let tenant_for_signing = req.tenant_id.clone().unwrap_or_else(|| "*".to_string());
    if let Err(resp) = check_signature(&state, &headers, "POST", &tenant_for_signing, "batch.flush")
    {
        return resp;
    }

    state.batch.flush_all(req.tenant_id.as_deref()).await;
    Json(HealthResponse { ok: true }).into_response()
}

async fn cache_stats<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<sheetgate_cache::CacheStats> {
    Json(state.cache.stats())
}

#[derive(Serialize)]
struct TenantCacheInfo {
    tenant_id: String,
    entries: usize,
}

async fn cache_tenant<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(tenant_id): Path<String>,
) -> Json<TenantCacheInfo> {
    let entries = state.cache.tenant_entry_count(&tenant_id);
    Json(TenantCacheInfo { tenant_id, entries })
}

async fn cache_tenant_invalidate<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
) -> Response {
    if let Err(resp) =
        check_signature(&state, &headers, "DELETE", &tenant_id, "cache.invalidate_tenant")
    {
        return resp;
    }
    state.cache.invalidate_tenant(&tenant_id);
    Json(HealthResponse { ok: true }).into_response()
}

async fn admin_metrics<C: DocumentClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> impl IntoResponse {
    let pool_stats = state.pool.stats().await;
    let batch_stats = state.batch.stats();
    let cache_stats = state.cache.stats();
    metrics::refresh_from_snapshots(&pool_stats, &batch_stats, &cache_stats, &state.config.tenant_metrics);
    (
        [("content-type", "text/plain; version=0.0.4")],
        metrics::encode(),
    )
}
