//! API error types.
//!
//! Every error leaves the server as an error [`Envelope`] whose status code
//! comes from [`ErrorKind::status_hint`]. The kind is also stored in the
//! response extensions so middleware can count errors by code.

use std::any::Any;

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use ecosort_core::envelope::{Envelope, ErrorKind};
use ecosort_core::service::ServiceError;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Pipeline failure (auth, quota, validation, classifier).
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Body could not be parsed or lacks the expected field.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Body exceeded the transport limit before validation could run.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unknown route or disabled endpoint.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The wire-level kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Service(err) => err.error_kind(),
            ApiError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            ApiError::PayloadTooLarge(_) => ErrorKind::TooLarge,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Service(ServiceError::Validation(err)) => err.message.clone(),
            ApiError::Service(ServiceError::Auth(err)) => err.to_string(),
            ApiError::Service(err @ ServiceError::Quota { .. }) => {
                format!("retry after {} seconds", err.retry_after_secs().unwrap_or(1))
            }
            ApiError::Service(ServiceError::Internal(_)) | ApiError::Internal(_) => String::new(),
            ApiError::MalformedRequest(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::NotFound(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        match kind {
            ErrorKind::Internal => error!(error = %self, "Request failed"),
            ErrorKind::NotFound => {}
            _ => warn!(code = kind.code(), error = %self, "Request rejected"),
        }

        let status =
            StatusCode::from_u16(kind.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.message();
        let body = Envelope::error(kind, (!message.is_empty()).then_some(message));

        let mut response = (status, Json(body)).into_response();

        if let ApiError::Service(err) = &self {
            if let Some(secs) = err.retry_after_secs() {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(secs));
            }
        }

        response.extensions_mut().insert(kind);
        response
    }
}

/// Renders a caught handler panic as a generic internal error envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::Internal(format!("handler panicked: {}", detail)).into_response()
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
