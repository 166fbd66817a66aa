//! Maps the shared error taxonomy onto the `{ok:false, code, error,
//! retry_after?}` HTTP response shape every admin route returns on failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sheetgate_core::SheetGateError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
    pub request_id: String,
}

/// `SheetGateError` -> `(status, body)`, the shape every handler in
/// `routes` returns on the error arm of its `Result`.
pub struct ApiError(pub SheetGateError);

impl From<SheetGateError> for ApiError {
    fn from(err: SheetGateError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &SheetGateError) -> StatusCode {
    match err {
        SheetGateError::TenantUnknown(_) => StatusCode::NOT_FOUND,
        SheetGateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        SheetGateError::PoolExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SheetGateError::AuthFailure { .. } => StatusCode::BAD_GATEWAY,
        SheetGateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SheetGateError::Conflict(_) => StatusCode::CONFLICT,
        SheetGateError::Cancelled(_) => StatusCode::CONFLICT,
        SheetGateError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            ok: false,
            code: self.0.code(),
            error: self.0.to_string(),
            retry_after: self.0.retry_after_secs(),
            request_id: uuid::Uuid::new_v4().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// 403, used by the signing middleware -- not part of the shared taxonomy
/// since it is an API-layer (not a domain) failure.
pub fn forbidden(reason: &str) -> Response {
    let body = ErrorBody {
        ok: false,
        code: "forbidden",
        error: reason.to_string(),
        retry_after: None,
        request_id: uuid::Uuid::new_v4().to_string(),
    };
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}
