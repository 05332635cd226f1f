//! `AppError`: the single error type every handler returns, mapped to an
//! HTTP status at the edge (spec §7). Everything below this layer stays a
//! typed `Result`; only here does it become a status code and JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use icvsb_client::ClientError;
use icvsb_core::error::{InvalidKeyError, ValidationError};
use icvsb_store::StoreError;
use serde_json::json;
use tracing::error;

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<InvalidKeyError> for AppError {
    /// Key-validity failures are 412 at HTTP (spec §7), not a generic
    /// conflict: the caller's cached labels are no longer trustworthy. The
    /// body surfaces the stable reason code (spec §4.3), not just prose.
    fn from(err: InvalidKeyError) -> Self {
        Self::with_status(StatusCode::PRECONDITION_FAILED, err.code())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::bad_request(msg),
            other => Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Store(e) => e.into(),
            ClientError::InvalidKey(e) => e.into(),
            ClientError::UnsupportedService(_) => Self::bad_request(err.to_string()),
            // §6.2: unknown `:id` is a 400 at `/benchmark/:id` and `/key/:id`.
            ClientError::UnknownBrc(_) => Self::bad_request(err.to_string()),
            // §6.2: `/benchmark/:id/key` is 422 while still first-benchmarking.
            ClientError::NotReady(_) => Self::unprocessable(err.to_string()),
            ClientError::EmptyDataset => Self::bad_request(err.to_string()),
            // §7: `UnsupportedBackend` is a 500 — the server misconfigured
            // its own store, not a client error.
            ClientError::UnsupportedBackend => {
                Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}
