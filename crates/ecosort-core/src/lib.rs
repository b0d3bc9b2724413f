//! EcoSort Core - Admission control, validation, and waste classification.
//!
//! This crate holds everything the EcoSort API does that is independent of
//! HTTP: configuration, API key checks, per-client rate limiting, input
//! validation, the text and image classifiers, and the response envelope.
//!
//! ## Example
//!
//! ```
//! use std::time::Instant;
//!
//! use ecosort_core::classifier::WasteLabel;
//! use ecosort_core::config::Config;
//! use ecosort_core::service::{ClassificationRequest, ClassificationService};
//!
//! let service = ClassificationService::from_config(&Config::default()).unwrap();
//! let request = ClassificationRequest::Text {
//!     value: "used AA battery".to_string(),
//! };
//! let result = service
//!     .classify(request, None, "127.0.0.1", Instant::now())
//!     .unwrap();
//! assert_eq!(result.label, WasteLabel::Hazardous);
//! ```

pub mod auth;
pub mod classifier;
pub mod config;
pub mod envelope;
pub mod rate_limit;
pub mod service;
pub mod validation;

pub use auth::{AuthError, AuthGuard};
pub use classifier::{ClassificationResult, Classifier, WasteLabel};
pub use config::{Config, ConfigError, Limits};
pub use envelope::{Envelope, ErrorKind};
pub use rate_limit::{Admission, ClientId, RateLimiter};
pub use service::{ClassificationRequest, ClassificationService, ServiceError};
pub use validation::{ValidationError, ValidationErrorKind};
