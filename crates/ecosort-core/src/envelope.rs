//! Uniform response envelope.
//!
//! Every response, success or failure, is written as one [`Envelope`]:
//!
//! ```json
//! {"status":"success","timestamp":"...","data":{"label":"recyclable","confidence":0.95,"tip":"..."}}
//! {"status":"error","timestamp":"...","error":"rate limit exceeded","code":"rate_limited"}
//! ```
//!
//! Exactly one of `data` and `error` is present and it always matches
//! `status`; the constructors are the only way to build an envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthError;
use crate::validation::ValidationErrorKind;

/// Closed set of failure kinds that can reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No credential presented while auth is enabled.
    Unauthorized,
    /// Credential presented but wrong.
    Forbidden,
    /// Client is over its rate limit.
    RateLimited,
    /// Text was empty after trimming, or the upload had no bytes.
    EmptyInput,
    /// Upload over the byte or pixel cap, or body over the transport limit.
    TooLarge,
    /// Declared type not allowed, or content is not a decodable image.
    UnsupportedType,
    /// Text longer than the character limit.
    TooLong,
    /// Markup, script, control characters, or a disguised file.
    UnsafeContent,
    /// Request body could not be parsed or lacks the expected field.
    MalformedRequest,
    /// Unknown route or disabled endpoint.
    NotFound,
    /// Unexpected failure; details are never exposed.
    Internal,
}

impl ErrorKind {
    /// Returns every error kind.
    pub fn all() -> &'static [ErrorKind] {
        &[
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::RateLimited,
            ErrorKind::EmptyInput,
            ErrorKind::TooLarge,
            ErrorKind::UnsupportedType,
            ErrorKind::TooLong,
            ErrorKind::UnsafeContent,
            ErrorKind::MalformedRequest,
            ErrorKind::NotFound,
            ErrorKind::Internal,
        ]
    }

    /// HTTP status code for this kind.
    pub fn status_hint(&self) -> u16 {
        match self {
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::RateLimited => 429,
            ErrorKind::EmptyInput
            | ErrorKind::TooLarge
            | ErrorKind::UnsupportedType
            | ErrorKind::TooLong
            | ErrorKind::UnsafeContent
            | ErrorKind::MalformedRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }

    /// Stable, human-readable `error` string.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rate limit exceeded",
            ErrorKind::EmptyInput => "empty input",
            ErrorKind::TooLarge => "file too large",
            ErrorKind::UnsupportedType => "unsupported file type",
            ErrorKind::TooLong => "text too long",
            ErrorKind::UnsafeContent => "unsafe content",
            ErrorKind::MalformedRequest => "malformed request",
            ErrorKind::NotFound => "not found",
            ErrorKind::Internal => "internal server error",
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::TooLong => "too_long",
            ErrorKind::UnsafeContent => "unsafe_content",
            ErrorKind::MalformedRequest => "malformed_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl From<ValidationErrorKind> for ErrorKind {
    fn from(kind: ValidationErrorKind) -> Self {
        match kind {
            ValidationErrorKind::EmptyInput => ErrorKind::EmptyInput,
            ValidationErrorKind::TooLarge => ErrorKind::TooLarge,
            ValidationErrorKind::UnsupportedType => ErrorKind::UnsupportedType,
            ValidationErrorKind::TooLong => ErrorKind::TooLong,
            ValidationErrorKind::UnsafeContent => ErrorKind::UnsafeContent,
        }
    }
}

impl From<AuthError> for ErrorKind {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => ErrorKind::Unauthorized,
            AuthError::Invalid => ErrorKind::Forbidden,
        }
    }
}

/// Envelope status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The only shape ever written to the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    status: Status,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> Envelope<T> {
    /// Wraps a successful result.
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            timestamp: Utc::now(),
            data: Some(data),
            error: None,
            code: None,
            message: None,
        }
    }

    /// Envelope status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Payload of a success envelope.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Stable error string of an error envelope.
    pub fn error_text(&self) -> Option<&'static str> {
        self.error
    }

    /// Detail message of an error envelope.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// When the envelope was built.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Error envelopes carry no data.
pub type ErrorEnvelope = Envelope<()>;

impl Envelope<()> {
    /// Wraps a failure. Internal errors never carry a detail message.
    pub fn error(kind: ErrorKind, message: Option<String>) -> Self {
        let message = match kind {
            ErrorKind::Internal => None,
            _ => message,
        };

        Self {
            status: Status::Error,
            timestamp: Utc::now(),
            data: None,
            error: Some(kind.description()),
            code: Some(kind.code()),
            message,
        }
    }
}

/// Builds an error envelope along with its HTTP status hint.
pub fn wrap_error(kind: ErrorKind, message: impl Into<String>) -> (u16, ErrorEnvelope) {
    let message = message.into();
    let message = (!message.is_empty()).then_some(message);
    (kind.status_hint(), Envelope::error(kind, message))
}

/// Builds a success envelope.
pub fn wrap_success<T>(data: T) -> Envelope<T> {
    Envelope::success(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationResult, WasteLabel};
    use serde_json::Value;

    fn to_json<T: Serialize>(envelope: &Envelope<T>) -> Value {
        serde_json::to_value(envelope).unwrap()
    }

    #[test]
    fn success_has_data_and_no_error() {
        let envelope = wrap_success(ClassificationResult::new(WasteLabel::Hazardous, 0.95));
        let json = to_json(&envelope);

        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["label"], "hazardous");
        assert!(json["data"]["tip"].is_string());
        assert!(json.get("error").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn error_has_error_and_no_data() {
        let (status, envelope) = wrap_error(ErrorKind::RateLimited, "");
        let json = to_json(&envelope);

        assert_eq!(status, 429);
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "rate limit exceeded");
        assert_eq!(json["code"], "rate_limited");
        assert!(json.get("data").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn error_message_is_kept() {
        let (status, envelope) = wrap_error(ErrorKind::TooLong, "text is 1001 characters");
        assert_eq!(status, 400);
        assert_eq!(envelope.message(), Some("text is 1001 characters"));
        assert_eq!(envelope.status(), Status::Error);
    }

    #[test]
    fn internal_error_hides_detail() {
        let (status, envelope) = wrap_error(ErrorKind::Internal, "index out of bounds at foo.rs:12");
        let json = to_json(&envelope);
        assert_eq!(status, 500);
        assert_eq!(json["error"], "internal server error");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn every_kind_has_exactly_one_of_data_or_error() {
        for kind in ErrorKind::all() {
            let (_, envelope) = wrap_error(*kind, "detail");
            assert!(envelope.data().is_none());
            assert!(envelope.error_text().is_some());
        }
        let ok = wrap_success(1u8);
        assert!(ok.data().is_some());
        assert!(ok.error_text().is_none());
    }

    #[test]
    fn status_hints_are_stable() {
        assert_eq!(ErrorKind::Unauthorized.status_hint(), 401);
        assert_eq!(ErrorKind::Forbidden.status_hint(), 403);
        assert_eq!(ErrorKind::EmptyInput.status_hint(), 400);
        assert_eq!(ErrorKind::TooLarge.status_hint(), 400);
        assert_eq!(ErrorKind::UnsupportedType.status_hint(), 400);
        assert_eq!(ErrorKind::TooLong.status_hint(), 400);
        assert_eq!(ErrorKind::UnsafeContent.status_hint(), 400);
        assert_eq!(ErrorKind::NotFound.status_hint(), 404);
        assert_eq!(ErrorKind::Internal.status_hint(), 500);
    }

    #[test]
    fn validation_and_auth_kinds_map() {
        assert_eq!(
            ErrorKind::from(ValidationErrorKind::UnsupportedType),
            ErrorKind::UnsupportedType
        );
        assert_eq!(ErrorKind::from(AuthError::Missing), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from(AuthError::Invalid), ErrorKind::Forbidden);
    }
}
