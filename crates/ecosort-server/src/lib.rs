//! EcoSort Server - HTTP API server.
//!
//! This crate provides the HTTP API for the EcoSort waste classifier.
//!
//! ## Endpoints
//!
//! - `POST /classify-text` - Classify a JSON `{"text": ...}` description
//! - `POST /classify-image` - Classify a multipart image upload (field `image`)
//! - `GET /` and `GET /health` - Service metadata
//! - `GET /metrics` - Request counters (when enabled)
//!
//! Every response body is an envelope with `status`, `timestamp`, and either
//! `data` or `error`.
//!
//! ## Example
//!
//! ```no_run
//! use ecosort_core::config::Config;
//! use ecosort_core::service::ClassificationService;
//! use ecosort_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = ClassificationService::from_config(&Config::default()).unwrap();
//!     let server = Server::new(ServerConfig::default(), service).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
pub mod extract;
mod handlers;
pub mod metrics;
pub mod models;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ecosort_core::service::ClassificationService;

pub use error::{ApiError, Result};
pub use handlers::SERVICE_NAME;
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default allowed CORS origin (local frontend dev server).
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Room for multipart boundaries and headers on top of the file cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Worst-case JSON bytes per character (`\uXXXX\uXXXX` surrogate pair).
const JSON_BYTES_PER_CHAR: usize = 12;

/// Room for the JSON object around the text field.
const TEXT_BODY_OVERHEAD: usize = 4 * 1024;

/// Body limit for `/classify-text`, sized to the longest valid description.
fn text_body_limit(max_text_chars: usize) -> usize {
    max_text_chars
        .saturating_mul(JSON_BYTES_PER_CHAR)
        .saturating_add(TEXT_BODY_OVERHEAD)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 5000).
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    /// Serve `GET /metrics`.
    pub enable_metrics: bool,
    /// Use the first `X-Forwarded-For` hop as the client address.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            enable_metrics: false,
            trust_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Enables or disables the metrics endpoint.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    /// Trusts `X-Forwarded-For` from a reverse proxy.
    pub fn with_trusted_proxy(mut self, trusted: bool) -> Self {
        self.trust_forwarded_for = trusted;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Invalid host/port combination.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(parsed))
}

/// Builds the application router.
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    let limits = state.service.limits();
    let body_limit = limits.max_file_bytes.saturating_add(MULTIPART_OVERHEAD);
    let text_limit = text_body_limit(limits.max_text_chars);

    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .route(
            "/classify-text",
            post(handlers::classify_text).layer(DefaultBodyLimit::max(text_limit)),
        )
        .route("/classify-image", post(handlers::classify_image))
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics::track_requests,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a new server around a configured classification service.
    pub fn new(
        config: ServerConfig,
        service: ClassificationService,
    ) -> std::result::Result<Self, ServerError> {
        let state = AppState::new(service)
            .with_metrics(config.enable_metrics)
            .with_trusted_proxy(config.trust_forwarded_for);
        Self::with_state(config, state)
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let router = app(state, &config.cors_origins);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::InvalidAddress(format!("{}:{}: {}", config.host, config.port, e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until the process is stopped.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` completes, then drains connections.
    pub async fn run_until<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting EcoSort API server on {}", self.addr);

        // Create socket with SO_REUSEADDR to allow binding even when sockets are lingering
        let socket = Socket::new(Domain::for_address(self.addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(1024)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("EcoSort API server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
