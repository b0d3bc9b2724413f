//! The classification pipeline.
//!
//! [`ClassificationService`] owns every stage a request passes through:
//!
//! ```text
//! AuthGuard -> RateLimiter -> validation -> Text/Image classifier
//! ```
//!
//! The first failing stage short-circuits the rest. Admission and
//! classification are also exposed separately so a transport can admit a
//! request before it reads the body.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::{AuthError, AuthGuard, Authorized};
use crate::classifier::{ClassificationResult, Classifier, ImageClassifier, TextClassifier};
use crate::config::{Config, ConfigError, Limits};
use crate::envelope::ErrorKind;
use crate::rate_limit::{Admission, ClientId, RateLimiter};
use crate::validation::{
    validate_image, validate_text, ImageMime, NormalizedImage, NormalizedText, ValidationError,
};

/// A classification request as received from a client.
#[derive(Debug, Clone)]
pub enum ClassificationRequest {
    /// Free-text description of an item.
    Text { value: String },
    /// Uploaded photo of an item.
    Image {
        bytes: Bytes,
        declared_type: String,
        size_bytes: usize,
    },
}

/// Pipeline errors.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("rate limit exceeded, retry after {}s", retry_after.as_secs())]
    Quota { retry_after: Duration },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// The wire-level kind for this error.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            ServiceError::Auth(err) => ErrorKind::from(*err),
            ServiceError::Quota { .. } => ErrorKind::RateLimited,
            ServiceError::Validation(err) => ErrorKind::from(err.kind),
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whole seconds until a rate-limited client may retry, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ServiceError::Quota { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// A request that passed authentication and admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub client: ClientId,
    pub authorized: Authorized,
    /// Admissions left in the client's current window.
    pub remaining: usize,
}

/// A classified text request.
#[derive(Debug, Clone)]
pub struct TextOutcome {
    pub text: NormalizedText,
    pub result: ClassificationResult,
}

/// A classified image request.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub width: u32,
    pub height: u32,
    pub mime: ImageMime,
    pub result: ClassificationResult,
}

/// Runs requests through admission, validation, and classification.
pub struct ClassificationService {
    limits: Limits,
    guard: AuthGuard,
    limiter: Arc<RateLimiter>,
    text_classifier: Arc<dyn Classifier<NormalizedText>>,
    image_classifier: Arc<dyn Classifier<NormalizedImage>>,
}

impl std::fmt::Debug for ClassificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationService")
            .field("limits", &self.limits)
            .field("auth_enabled", &self.guard.is_enabled())
            .field("limiter", &self.limiter)
            .field("text_classifier", &self.text_classifier.name())
            .field("image_classifier", &self.image_classifier.name())
            .finish()
    }
}

impl ClassificationService {
    /// Builds the service with the default classifiers. Fails on invalid config.
    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            limits: config.limits.clone(),
            guard: AuthGuard::new(config.api_key.clone()),
            limiter: Arc::new(RateLimiter::from_limits(&config.limits)),
            text_classifier: Arc::new(TextClassifier::new()),
            image_classifier: Arc::new(ImageClassifier::new()),
        })
    }

    /// Replaces the text classifier.
    pub fn with_text_classifier(mut self, classifier: Arc<dyn Classifier<NormalizedText>>) -> Self {
        self.text_classifier = classifier;
        self
    }

    /// Replaces the image classifier.
    pub fn with_image_classifier(
        mut self,
        classifier: Arc<dyn Classifier<NormalizedImage>>,
    ) -> Self {
        self.image_classifier = classifier;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn auth_enabled(&self) -> bool {
        self.guard.is_enabled()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Authenticates and admits a request.
    ///
    /// Requests failing authentication never consume quota. Accepted keys are
    /// rate limited per key; anonymous callers per `peer`.
    pub fn admit(&self, presented_key: Option<&str>, peer: &str, now: Instant) -> Result<Admitted> {
        let authorized = self.guard.authorize(presented_key).map_err(|err| {
            debug!(peer = %peer, error = %err, "Authentication failed");
            ServiceError::Auth(err)
        })?;

        let client = match authorized.key_fingerprint() {
            Some(fp) => ClientId::from_key_fingerprint(fp),
            None => ClientId::from_ip(peer),
        };

        match self.limiter.admit(&client, now) {
            Admission::Allowed { remaining } => Ok(Admitted {
                client,
                authorized,
                remaining,
            }),
            Admission::Denied { retry_after } => Err(ServiceError::Quota { retry_after }),
        }
    }

    /// Validates and classifies text. Assumes the request was admitted.
    pub fn classify_text(&self, raw: &str) -> Result<TextOutcome> {
        let text = validate_text(raw, &self.limits)?;
        let result = run_guarded(self.text_classifier.as_ref(), &text)?;
        Ok(TextOutcome { text, result })
    }

    /// Validates and classifies an image. Assumes the request was admitted.
    pub fn classify_image(
        &self,
        bytes: impl Into<Bytes>,
        declared_type: &str,
        size_bytes: usize,
    ) -> Result<ImageOutcome> {
        let image = validate_image(bytes, declared_type, size_bytes, &self.limits)?;
        let result = run_guarded(self.image_classifier.as_ref(), &image)?;
        Ok(ImageOutcome {
            width: image.width(),
            height: image.height(),
            mime: image.mime(),
            result,
        })
    }

    /// Runs the whole pipeline for one request.
    pub fn classify(
        &self,
        request: ClassificationRequest,
        presented_key: Option<&str>,
        peer: &str,
        now: Instant,
    ) -> Result<ClassificationResult> {
        self.admit(presented_key, peer, now)?;

        match request {
            ClassificationRequest::Text { value } => Ok(self.classify_text(&value)?.result),
            ClassificationRequest::Image {
                bytes,
                declared_type,
                size_bytes,
            } => Ok(self.classify_image(bytes, &declared_type, size_bytes)?.result),
        }
    }
}

/// Calls a classifier, turning a panic into an internal error.
fn run_guarded<I: ?Sized>(classifier: &dyn Classifier<I>, input: &I) -> Result<ClassificationResult> {
    catch_unwind(AssertUnwindSafe(|| classifier.classify(input))).map_err(|_| {
        error!(classifier = classifier.name(), "Classifier panicked");
        ServiceError::Internal(format!("classifier '{}' failed", classifier.name()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::WasteLabel;
    use crate::validation::test_images::png;
    use crate::validation::ValidationErrorKind;

    const KEY: &str = "test-key-0123456789";

    fn service(limit: usize) -> ClassificationService {
        let config = Config::new(Limits::default().with_requests_per_minute(limit));
        ClassificationService::from_config(&config).unwrap()
    }

    fn secured(limit: usize) -> ClassificationService {
        let config = Config::new(Limits::default().with_requests_per_minute(limit)).with_api_key(KEY);
        ClassificationService::from_config(&config).unwrap()
    }

    fn text(value: &str) -> ClassificationRequest {
        ClassificationRequest::Text {
            value: value.to_string(),
        }
    }

    struct Exploding;

    impl Classifier<NormalizedText> for Exploding {
        fn classify(&self, _input: &NormalizedText) -> ClassificationResult {
            panic!("model crashed")
        }

        fn name(&self) -> &'static str {
            "exploding"
        }
    }

    struct AlwaysHazardous;

    impl Classifier<NormalizedImage> for AlwaysHazardous {
        fn classify(&self, _input: &NormalizedImage) -> ClassificationResult {
            ClassificationResult::new(WasteLabel::Hazardous, 0.99)
        }

        fn name(&self) -> &'static str {
            "always-hazardous"
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let config = Config::default().with_api_key("short");
        assert_eq!(
            ClassificationService::from_config(&config).unwrap_err(),
            ConfigError::ApiKeyTooShort
        );
    }

    #[test]
    fn classifies_text_end_to_end() {
        let svc = service(10);
        let result = svc
            .classify(text("old battery"), None, "127.0.0.1", Instant::now())
            .unwrap();
        assert_eq!(result.label, WasteLabel::Hazardous);
    }

    #[test]
    fn classifies_image_end_to_end() {
        let svc = service(10);
        let bytes = png(16, 16, [128, 128, 128]);
        let size = bytes.len();
        let request = ClassificationRequest::Image {
            bytes: Bytes::from(bytes),
            declared_type: "image/png".to_string(),
            size_bytes: size,
        };
        let result = svc.classify(request, None, "127.0.0.1", Instant::now()).unwrap();
        assert_eq!(result.label, WasteLabel::Recyclable);
    }

    #[test]
    fn image_outcome_reports_metadata() {
        let svc = service(10);
        let bytes = png(20, 10, [128, 128, 128]);
        let size = bytes.len();
        let outcome = svc.classify_image(bytes, "image/png", size).unwrap();
        assert_eq!((outcome.width, outcome.height), (20, 10));
        assert_eq!(outcome.mime, ImageMime::Png);
    }

    #[test]
    fn text_outcome_keeps_normalized_input() {
        let outcome = service(10).classify_text("  glass jar  ").unwrap();
        assert_eq!(outcome.text.as_str(), "glass jar");
        assert_eq!(outcome.result.label, WasteLabel::Recyclable);
    }

    #[test]
    fn rate_limit_precedes_validation() {
        let svc = service(1);
        let now = Instant::now();

        let first = svc.classify(text(""), None, "10.0.0.1", now).unwrap_err();
        assert_eq!(first.error_kind(), ErrorKind::EmptyInput);

        // The invalid request still consumed the only admission.
        let second = svc.classify(text("paper"), None, "10.0.0.1", now).unwrap_err();
        assert_eq!(second.error_kind(), ErrorKind::RateLimited);
        assert!(second.retry_after_secs().unwrap() >= 1);
    }

    #[test]
    fn auth_precedes_rate_limit() {
        let svc = secured(1);
        let now = Instant::now();

        for _ in 0..5 {
            let err = svc.classify(text("paper"), None, "10.0.0.1", now).unwrap_err();
            assert_eq!(err.error_kind(), ErrorKind::Unauthorized);
        }
        let err = svc
            .classify(text("paper"), Some("wrong-key"), "10.0.0.1", now)
            .unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::Forbidden);

        // Failed authentication consumed nothing.
        assert!(svc.classify(text("paper"), Some(KEY), "10.0.0.1", now).is_ok());
    }

    #[test]
    fn authenticated_clients_are_keyed_by_key() {
        let svc = secured(1);
        let now = Instant::now();

        let admitted = svc.admit(Some(KEY), "10.0.0.1", now).unwrap();
        assert!(admitted.client.as_str().starts_with("key:"));

        // Same key from another address shares the quota.
        let err = svc.admit(Some(KEY), "10.0.0.2", now).unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn anonymous_clients_are_keyed_by_peer() {
        let svc = service(1);
        let now = Instant::now();

        let admitted = svc.admit(None, "10.0.0.1", now).unwrap();
        assert_eq!(admitted.client.as_str(), "ip:10.0.0.1");
        assert_eq!(admitted.authorized, Authorized::Open);
        assert_eq!(admitted.remaining, 0);
        assert!(svc.admit(None, "10.0.0.2", now).is_ok());
    }

    #[test]
    fn validation_errors_carry_kind() {
        let svc = service(100);
        let now = Instant::now();
        let long = "a".repeat(1001);

        let err = svc.classify(text(&long), None, "p", now).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError {
                kind: ValidationErrorKind::TooLong,
                ..
            })
        ));

        let err = svc
            .classify(text("<script>alert(1)</script>"), None, "p", now)
            .unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::UnsafeContent);

        let err = svc
            .classify(
                ClassificationRequest::Image {
                    bytes: Bytes::from_static(b"%PDF-1.4"),
                    declared_type: "application/pdf".to_string(),
                    size_bytes: 8,
                },
                None,
                "p",
                now,
            )
            .unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn panicking_classifier_becomes_internal_error() {
        let svc = service(10).with_text_classifier(Arc::new(Exploding));
        let err = svc.classify_text("paper").unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::Internal);
    }

    #[test]
    fn image_classifier_is_replaceable() {
        let svc = service(10).with_image_classifier(Arc::new(AlwaysHazardous));
        let bytes = png(8, 8, [128, 128, 128]);
        let size = bytes.len();
        let outcome = svc.classify_image(bytes, "image/png", size).unwrap();
        assert_eq!(outcome.result.label, WasteLabel::Hazardous);
    }

    #[test]
    fn retry_after_rounds_up() {
        let err = ServiceError::Quota {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.retry_after_secs(), Some(2));

        let err = ServiceError::Quota {
            retry_after: Duration::ZERO,
        };
        assert_eq!(err.retry_after_secs(), Some(1));
    }
}
