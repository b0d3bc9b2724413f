//! Application state for the API server.

use std::sync::Arc;

use ecosort_core::service::ClassificationService;

use crate::metrics::Metrics;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Admission, validation, and classification pipeline.
    pub service: Arc<ClassificationService>,
    /// Request counters.
    pub metrics: Arc<Metrics>,
    /// Whether `GET /metrics` is served.
    pub enable_metrics: bool,
    /// Whether `X-Forwarded-For` identifies anonymous clients.
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Creates application state around a configured service.
    pub fn new(service: ClassificationService) -> Self {
        Self {
            service: Arc::new(service),
            metrics: Arc::new(Metrics::new()),
            enable_metrics: false,
            trust_forwarded_for: false,
        }
    }

    /// Enables or disables the metrics endpoint.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Trusts the first `X-Forwarded-For` hop as the client address.
    pub fn with_trusted_proxy(mut self, trusted: bool) -> Self {
        self.trust_forwarded_for = trusted;
        self
    }
}
