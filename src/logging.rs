//! # Structured Logging Module
//!
//! Environment-aware structured logging for the worker loop and the
//! caller-side merge path.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// `filter_override` takes precedence over `RUST_LOG` and the environment
/// derived level. Safe to call more than once.
pub fn init_structured_logging(filter_override: Option<&str>) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = filter_override
            .map(String::from)
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| get_log_level(&environment).to_string());
        let json = wants_json_output();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        };

        // Another subscriber may already be installed (tests, embedding hosts)
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            filter = %filter,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("PATIENT_WORKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn wants_json_output() -> bool {
    std::env::var("PATIENT_WORKER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for queue operations
pub fn log_queue_operation(
    operation: &str,
    context: &str,
    request_id: Option<&str>,
    queue_len: usize,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        context = %context,
        request_id = request_id,
        queue_len = queue_len,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📥 QUEUE_OPERATION"
    );
}

/// Log structured data for handler executions
pub fn log_handler_operation(
    handler: &str,
    request_id: &str,
    method: Option<&str>,
    status: &str,
    duration_ms: u64,
) {
    tracing::info!(
        handler = %handler,
        request_id = %request_id,
        method = method,
        status = %status,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "⚙️ HANDLER_OPERATION"
    );
}

/// Log structured data for store merges
pub fn log_merge_operation(action: &str, context: &str, status: &str, details: Option<&str>) {
    tracing::debug!(
        action = %action,
        context = %context,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧩 MERGE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
