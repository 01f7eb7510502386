//! # Structured Logging Module
//!
//! Environment-aware structured logging on stderr. Stdout is left to the
//! host boundary, which may use it for results. The global filter sits
//! behind a reload handle so a session start can change the level at runtime.

use std::sync::OnceLock;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{DispatchError, Result};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// `RUST_LOG` wins over the environment default. Set
/// `AGENT_WORKER_LOG_FORMAT=json` for JSON lines.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));
        let (filter, handle) = reload::Layer::new(filter);

        let json = std::env::var("AGENT_WORKER_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(json.then(|| {
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(false)
            }))
            .with((!json).then(|| {
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
            }));

        // Another subscriber may already be installed by the embedding host.
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        let _ = FILTER_HANDLE.set(handle);
        tracing::info!(
            environment = %environment,
            pid = std::process::id(),
            json,
            "Structured logging initialized"
        );
    });
}

/// Map a user-supplied level name onto a tracing filter
///
/// Accepts `trace`, `debug`, `info`, `warn`/`warning` and `error`/`critical`,
/// case-insensitively.
pub fn parse_log_level(level: &str) -> Result<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" => Ok(LevelFilter::ERROR),
        _ => Err(DispatchError::invalid_config(format!(
            "logger: invalid log level '{level}'"
        ))),
    }
}

/// Validate `level` and apply it to the global filter
///
/// Without an initialized subscriber the level is only validated.
pub fn set_log_level(level: &str) -> Result<()> {
    let filter = parse_log_level(level)?;

    if let Some(handle) = FILTER_HANDLE.get() {
        handle
            .reload(EnvFilter::new(filter.to_string()))
            .map_err(|e| DispatchError::config(format!("logger: failed to apply log level: {e}")))?;
        tracing::info!(level = %filter, "Log level updated");
    }

    Ok(())
}

fn get_environment() -> String {
    std::env::var("AGENT_WORKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}
