//! Service configuration and limits.
//!
//! A [`Config`] is built once at process start and checked with
//! [`Config::validate`]; request handling never falls back to defaults on its
//! own.

use std::time::Duration;

use thiserror::Error;

use crate::auth::ApiKey;
use crate::validation::ImageMime;

/// Default maximum text length, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 1000;

/// Default maximum upload size (16 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 16 * 1024 * 1024;

/// Default maximum decoded image size (100 megapixels).
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 100_000_000;

/// Default admissions per client per window.
pub const DEFAULT_REQUESTS_PER_WINDOW: usize = 60;

/// Default rate-limit window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Minimum accepted API key length, in bytes.
pub const MIN_API_KEY_LEN: usize = 16;

/// Configuration errors, reported at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A numeric limit must be positive.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// No image types are allowed.
    #[error("at least one image type must be allowed")]
    NoImageTypes,

    /// API key is set but blank.
    #[error("API key is set but empty")]
    EmptyApiKey,

    /// API key is too short to be a meaningful secret.
    #[error("API key must be at least {MIN_API_KEY_LEN} bytes")]
    ApiKeyTooShort,
}

/// Input and admission limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum text length in characters (after trimming).
    pub max_text_chars: usize,
    /// Maximum upload size in bytes.
    pub max_file_bytes: usize,
    /// Maximum `width * height` of an uploaded image.
    pub max_image_pixels: u64,
    /// Image types accepted by the image endpoint.
    pub allowed_image_types: Vec<ImageMime>,
    /// Admissions allowed per client within one window.
    pub requests_per_window: usize,
    /// Sliding window length.
    pub window: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            allowed_image_types: ImageMime::all().to_vec(),
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window: DEFAULT_WINDOW,
        }
    }
}

impl Limits {
    /// Sets the per-minute request limit (window stays one minute).
    pub fn with_requests_per_minute(mut self, requests: usize) -> Self {
        self.requests_per_window = requests;
        self.window = Duration::from_secs(60);
        self
    }

    /// Sets the maximum upload size in MiB.
    pub fn with_max_file_mb(mut self, mb: usize) -> Self {
        self.max_file_bytes = mb.saturating_mul(1024 * 1024);
        self
    }

    /// Comma-separated allow-list, for error messages.
    pub fn allowed_types_display(&self) -> String {
        self.allowed_image_types
            .iter()
            .map(|m| m.short_name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_text_chars == 0 {
            return Err(ConfigError::ZeroLimit("max_text_chars"));
        }
        if self.max_file_bytes == 0 {
            return Err(ConfigError::ZeroLimit("max_file_bytes"));
        }
        if self.max_image_pixels == 0 {
            return Err(ConfigError::ZeroLimit("max_image_pixels"));
        }
        if self.requests_per_window == 0 {
            return Err(ConfigError::ZeroLimit("requests_per_window"));
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroLimit("window"));
        }
        if self.allowed_image_types.is_empty() {
            return Err(ConfigError::NoImageTypes);
        }
        Ok(())
    }
}

/// Complete core configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Input and admission limits.
    pub limits: Limits,
    /// API key; `None` disables authentication.
    pub api_key: Option<ApiKey>,
}

impl Config {
    /// Creates a config with the given limits and no API key.
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            api_key: None,
        }
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    /// Validates the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;

        if let Some(key) = &self.api_key {
            if key.expose().trim().is_empty() {
                return Err(ConfigError::EmptyApiKey);
            }
            if key.expose().len() < MIN_API_KEY_LEN {
                return Err(ConfigError::ApiKeyTooShort);
            }
        }

        Ok(())
    }

    /// Whether API key authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
