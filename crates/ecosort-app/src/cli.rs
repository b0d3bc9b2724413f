//! Command-line and environment configuration.
//!
//! Every setting can be given as a flag or through its environment variable;
//! flags win. The result is turned into a core [`Config`] and a
//! [`ServerConfig`], and the core config is validated before anything starts.

use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::Parser;
use directories::ProjectDirs;

use ecosort_core::config::{
    Config, ConfigError, Limits, DEFAULT_MAX_TEXT_CHARS, DEFAULT_REQUESTS_PER_WINDOW,
};
use ecosort_server::{ServerConfig, DEFAULT_CORS_ORIGIN, DEFAULT_HOST, DEFAULT_PORT};

/// Default upload cap in MiB.
pub const DEFAULT_MAX_FILE_MB: usize = 16;

/// EcoSort - waste classification API
#[derive(Parser, Debug, Clone)]
#[command(name = "ecosort", version, about)]
pub struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind to
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// API key required on classification requests (disabled when unset)
    #[arg(long, env = "ECOSORT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Requests allowed per client per minute
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = DEFAULT_REQUESTS_PER_WINDOW)]
    pub rate_limit_per_minute: usize,

    /// Maximum upload size in MiB
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value_t = DEFAULT_MAX_FILE_MB)]
    pub max_file_size_mb: usize,

    /// Maximum text length in characters
    #[arg(long, env = "MAX_TEXT_LENGTH", default_value_t = DEFAULT_MAX_TEXT_CHARS)]
    pub max_text_length: usize,

    /// Allowed CORS origins, comma separated ("*" for any)
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = DEFAULT_CORS_ORIGIN
    )]
    pub cors_origins: Vec<String>,

    /// Serve GET /metrics
    #[arg(long, env = "ENABLE_METRICS", value_parser = FalseyValueParser::new())]
    pub enable_metrics: bool,

    /// Identify anonymous clients by X-Forwarded-For (behind a reverse proxy)
    #[arg(long, env = "TRUST_PROXY", value_parser = FalseyValueParser::new())]
    pub trust_proxy: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory for rolling log files
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Effective log level.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Log directory: `--log-dir`, else the platform data directory.
    pub fn logs_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(|| {
            ProjectDirs::from("", "ecosort", "EcoSort").map(|dirs| dirs.data_dir().join("logs"))
        })
    }

    /// Builds and validates the core configuration.
    pub fn core_config(&self) -> Result<Config, ConfigError> {
        let limits = Limits {
            max_text_chars: self.max_text_length,
            ..Limits::default()
        }
        .with_requests_per_minute(self.rate_limit_per_minute)
        .with_max_file_mb(self.max_file_size_mb);

        let mut config = Config::new(limits);
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Builds the HTTP server configuration.
    pub fn server_config(&self) -> ServerConfig {
        let origins = self
            .cors_origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        ServerConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_cors_origins(origins)
            .with_metrics(self.enable_metrics)
            .with_trusted_proxy(self.trust_proxy)
    }
}
