//! API request and response models.

use serde::{Deserialize, Serialize};

use ecosort_core::classifier::ClassificationResult;
use ecosort_core::config::Limits;

/// Longest input echo returned by `/classify-text`, in characters.
pub const INPUT_PREVIEW_CHARS: usize = 100;

/// Request body for POST /classify-text.
#[derive(Debug, Deserialize)]
pub struct ClassifyTextRequest {
    /// Free-text description of the item.
    pub text: String,
}

/// Response data for POST /classify-text.
#[derive(Debug, Serialize)]
pub struct TextClassification {
    #[serde(flatten)]
    pub result: ClassificationResult,
    /// Normalized input, truncated to [`INPUT_PREVIEW_CHARS`].
    pub input_text: String,
}

/// Decoded image metadata.
#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: &'static str,
}

/// Response data for POST /classify-image.
#[derive(Debug, Serialize)]
pub struct ImageClassification {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub image_info: ImageInfo,
}

/// Feature flags reported by the health endpoint.
#[derive(Debug, Serialize)]
pub struct Features {
    pub text_classification: bool,
    pub image_classification: bool,
    pub rate_limiting: bool,
    pub api_auth: bool,
    pub metrics: bool,
}

/// Limits reported by the health endpoint.
#[derive(Debug, Serialize)]
pub struct LimitsInfo {
    pub max_text_length: usize,
    pub max_file_size_bytes: usize,
    pub allowed_image_types: Vec<&'static str>,
    pub rate_limit_per_window: usize,
    pub rate_limit_window_seconds: u64,
}

impl From<&Limits> for LimitsInfo {
    fn from(limits: &Limits) -> Self {
        Self {
            max_text_length: limits.max_text_chars,
            max_file_size_bytes: limits.max_file_bytes,
            allowed_image_types: limits
                .allowed_image_types
                .iter()
                .map(|m| m.as_mime())
                .collect(),
            rate_limit_per_window: limits.requests_per_window,
            rate_limit_window_seconds: limits.window.as_secs(),
        }
    }
}

/// Response data for GET / and GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub features: Features,
    pub limits: LimitsInfo,
}
