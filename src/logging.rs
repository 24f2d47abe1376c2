//! Logging configuration with file rotation
//!
//! This module provides logging setup with:
//! - stderr and/or daily-rotated file output
//! - optional JSON formatting for log shippers
//! - tool-call logging with credential redaction

use crate::config::LoggingConfig;
use crate::error::{Result, Things5Error};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level
    pub level: Level,

    /// Log to file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,

    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
            thread_ids: false,
        }
    }
}

fn level_from_directive(directive: &str) -> Option<Level> {
    let directive = directive.to_lowercase();
    if directive.contains("trace") {
        Some(Level::TRACE)
    } else if directive.contains("debug") {
        Some(Level::DEBUG)
    } else if directive.contains("info") {
        Some(Level::INFO)
    } else if directive.contains("warn") {
        Some(Level::WARN)
    } else if directive.contains("error") {
        Some(Level::ERROR)
    } else {
        None
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(level) = std::env::var("RUST_LOG")
            .ok()
            .and_then(|v| level_from_directive(&v))
        {
            config.level = level;
        }

        if let Ok(log_file) = std::env::var("THINGS5_LOG_FILE") {
            config.file_path = Some(PathBuf::from(log_file));
        }

        if let Ok(log_stderr) = std::env::var("THINGS5_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(log_json) = std::env::var("THINGS5_LOG_JSON") {
            config.json = log_json.to_lowercase() == "true";
        }

        config
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: level_from_directive(&config.level).unwrap_or(Level::INFO),
            file_path: config.file.as_ref().map(PathBuf::from),
            json: config.json_format,
            ..Self::default()
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer<W>(writer: W, ansi: bool, config: &LogConfig) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if config.json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_thread_ids(config.thread_ids)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(config.thread_ids)
            .boxed()
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stderr {
        layers.push(output_layer(std::io::stderr, true, &config));
    }

    if let Some(file_path) = &config.file_path {
        // Ensure parent directory exists
        let directory = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        std::fs::create_dir_all(directory)?;

        let file_name = file_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("things5-intent.log"));
        let file_appender = tracing_appender::rolling::daily(directory, file_name);
        layers.push(output_layer(file_appender, false, &config));
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Things5Error::config(format!("Failed to install logger: {}", e)))
}

/// Logging middleware for intent resolution calls
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Log tool invocation
    pub fn log_tool_call(request_id: &str, tool_name: &str, params: &serde_json::Value) {
        let sanitized_params = Self::sanitize_params(params);

        tracing::info!(
            request_id = request_id,
            tool = tool_name,
            params = %sanitized_params,
            "Resolving tool call"
        );
    }

    /// Log the outcome of a resolution
    pub fn log_resolution(
        request_id: &str,
        tool_name: &str,
        duration_ms: u64,
        status: &str,
        response: &serde_json::Value,
    ) {
        let sanitized_response = Self::sanitize_response(response);

        if status == "failed" {
            tracing::warn!(
                request_id = request_id,
                tool = tool_name,
                duration_ms = duration_ms,
                status = status,
                response = %sanitized_response,
                "Resolution failed"
            );
        } else {
            tracing::info!(
                request_id = request_id,
                tool = tool_name,
                duration_ms = duration_ms,
                status = status,
                response = %sanitized_response,
                "Resolution finished"
            );
        }
    }

    /// Sanitize parameters to remove sensitive data
    pub fn sanitize_params(params: &serde_json::Value) -> serde_json::Value {
        match params {
            serde_json::Value::Object(map) => {
                let mut sanitized = serde_json::Map::new();
                for (key, value) in map {
                    if Self::is_sensitive_field(key) {
                        sanitized.insert(key.clone(), serde_json::Value::String("***".to_string()));
                    } else {
                        sanitized.insert(key.clone(), Self::sanitize_params(value));
                    }
                }
                serde_json::Value::Object(sanitized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::sanitize_params).collect())
            }
            _ => params.clone(),
        }
    }

    /// Sanitize response data, truncating long suggestion lists
    fn sanitize_response(response: &serde_json::Value) -> serde_json::Value {
        match response {
            serde_json::Value::Array(arr) if arr.len() > 10 => {
                let mut truncated: Vec<_> = arr.iter().take(10).map(Self::sanitize_params).collect();
                truncated.push(serde_json::Value::String(format!(
                    "... ({} more items)",
                    arr.len() - 10
                )));
                serde_json::Value::Array(truncated)
            }
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| {
                        if Self::is_sensitive_field(key) {
                            (key.clone(), serde_json::Value::String("***".to_string()))
                        } else {
                            (key.clone(), Self::sanitize_response(value))
                        }
                    })
                    .collect(),
            ),
            _ => Self::sanitize_params(response),
        }
    }

    /// Check if a field name indicates sensitive data
    fn is_sensitive_field(field: &str) -> bool {
        let field_lower = field.to_lowercase();
        field_lower.contains("password")
            || field_lower.contains("secret")
            || field_lower.contains("token")
            || field_lower.contains("api_key")
            || field_lower.contains("auth")
            || field_lower.contains("credential")
    }
}
