//! Structured logging and security-focused trace utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities to prevent
//! session tokens and backend keys from leaking into logs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::Result;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Whether [`sanitize`] redacts. Set once by [`init`]; redacts until then.
static SANITIZE: OnceCell<bool> = OnceCell::new();

/// Three base64url segments starting with `eyJ` (a JSON header).
static JWT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").expect("valid JWT regex")
});

/// Backend secret keys (`sb_secret_...`, `sb_publishable_...`).
static API_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sb_(secret|publishable)_[A-Za-z0-9_-]+").expect("valid key regex"));

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let _ = SANITIZE.set(config.sanitize_tokens);

    // Configure filter from environment or config file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Sanitizes sensitive information from log messages.
///
/// Replaces JWT-shaped access tokens with `[REDACTED_ACCESS_TOKEN]` and
/// backend API keys with `[REDACTED_API_KEY]`. A no-op when logging was
/// initialised with `sanitize_tokens = false`.
pub fn sanitize(input: &str) -> String {
    if !SANITIZE.get().copied().unwrap_or(true) {
        return input.to_string();
    }

    let result = JWT_PATTERN.replace_all(input, "[REDACTED_ACCESS_TOKEN]");
    API_KEY_PATTERN
        .replace_all(&result, "[REDACTED_API_KEY]")
        .into_owned()
}
