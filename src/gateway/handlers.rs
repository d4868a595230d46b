//! Gateway request handlers.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use super::state::AppState;
use crate::intake::IntakeError;

/// Header carrying the provider's base64 event signature.
pub const SIGNATURE_HEADER: &str = "Digital-Signature";

/// Provider event webhook.
///
/// POST /api/v1/webhooks/provider
///
/// The body is taken as raw bytes; the signature covers the bytes exactly as
/// sent. A 2xx with empty body acknowledges the event; each rejection
/// category gets its own status so the provider's retry loop can classify.
pub async fn provider_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, IntakeError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(IntakeError::InvalidSignature)?;

    state.intake.handle(&body, signature).await?;
    Ok(StatusCode::OK)
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub timestamp_ms: u64,
}

/// Liveness probe with the server timestamp.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (
        StatusCode::OK,
        Json(HealthResponse {
            timestamp_ms: now_ms,
        }),
    )
}
