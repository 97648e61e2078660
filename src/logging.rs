//! # Structured Logging Module
//!
//! Environment-aware structured logging for the relay. Console output is
//! human-readable by default; set `MENU_EVENTS_LOG_FORMAT=json` for one JSON
//! object per line. `RUST_LOG` overrides the environment-derived level.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let json_layer = json.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(false)
        });
        let plain_layer = (!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(plain_layer);

        // Embedding applications may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json_output = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    crate::config::loader::detect_environment()
}

fn use_json_format() -> bool {
    std::env::var("MENU_EVENTS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
pub fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "info".to_string(),
    }
}

/// Log structured data for a broker delivery
pub fn log_delivery_operation(
    pattern: &str,
    attempt: u32,
    max_attempts: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        pattern = %pattern,
        attempt = attempt,
        max_attempts = max_attempts,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📨 DELIVERY_OPERATION"
    );
}

/// Log structured data for failure store operations
pub fn log_store_operation(
    operation: &str,
    store: &str,
    record_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        store = %store,
        record_id = record_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🗄️ STORE_OPERATION"
    );
}

/// Log the outcome of one scheduler pass
pub fn log_scheduler_pass(pass: &str, store: Option<&str>, processed: u64, failed: u64, details: Option<&str>) {
    tracing::info!(
        pass = %pass,
        store = store,
        processed = processed,
        failed = failed,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "⏰ SCHEDULER_PASS"
    );
}
