//! Intake rejection categories.
//!
//! Every failed check maps to a distinct HTTP status so the provider's retry
//! machinery can tell terminal rejections apart from transient faults.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("missing or invalid event signature")]
    InvalidSignature,
    #[error("event outside the acceptance window")]
    EventTooOld,
    #[error("event already processed")]
    AlreadyProcessed,
    #[error("event from untrusted workspace {0}")]
    UntrustedWorkspace(String),
    #[error("malformed event body: {0}")]
    MalformedBody(String),
    #[error("record store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl IntakeError {
    pub fn code(&self) -> &'static str {
        match self {
            IntakeError::InvalidSignature => "INVALID_SIGNATURE",
            IntakeError::EventTooOld => "EVENT_TOO_OLD",
            IntakeError::AlreadyProcessed => "ALREADY_PROCESSED",
            IntakeError::UntrustedWorkspace(_) => "UNTRUSTED_WORKSPACE",
            IntakeError::MalformedBody(_) => "MALFORMED_BODY",
            IntakeError::Store(_) => "STORE_UNAVAILABLE",
            IntakeError::Dispatch(_) => "DISPATCH_FAILED",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            IntakeError::InvalidSignature => StatusCode::UNAUTHORIZED,
            IntakeError::EventTooOld => StatusCode::GONE,
            IntakeError::AlreadyProcessed => StatusCode::CONFLICT,
            IntakeError::UntrustedWorkspace(_) | IntakeError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            IntakeError::Store(_) | IntakeError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct IntakeErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let body = IntakeErrorResponse {
            error: self.code(),
            message: self.to_string(),
        };
        (self.http_status(), Json(body)).into_response()
    }
}
