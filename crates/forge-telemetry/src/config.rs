//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or full directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to include source file and line in log lines
    pub with_source: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "forge".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            with_source: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_SERVICE_NAME`: Service name (default: forge)
    /// - `FORGE_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `FORGE_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `FORGE_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `FORGE_LOG_SOURCE`: Include file/line in log lines (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("FORGE_SERVICE_NAME").unwrap_or_else(|_| "forge".to_string()),

            log_level: env::var("FORGE_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("FORGE_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("FORGE_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(is_container),

            with_source: env::var("FORGE_LOG_SOURCE")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(false),
        }
    }

    /// Override the level, e.g. from a `--verbose` CLI flag.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

/// Interpret `true/1/yes/on` and `false/0/no/off`; anything else is `default`.
fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
