//! EcoSort - waste classification API.
//!
//! This crate provides the `ecosort` binary's configuration surface: CLI
//! flags with environment fallbacks, turned into validated core and server
//! configurations.
//!
//! # Usage
//!
//! ```
//! use clap::Parser;
//! use ecosort_app::cli::Args;
//!
//! let args = Args::try_parse_from(["ecosort", "--port", "8080", "--rate-limit-per-minute", "30"]).unwrap();
//! let config = args.core_config().unwrap();
//! assert_eq!(config.limits.requests_per_window, 30);
//! assert_eq!(args.server_config().port, 8080);
//! ```

pub mod cli;

pub use cli::Args;
