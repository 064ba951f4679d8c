//! Command-line interface definitions
//!
//! Only logging and telemetry live on the command line. Engine behaviour
//! (shell, interpreter, timeouts) comes from `CODE_EXEC_*` environment
//! variables, see [`crate::types::EngineConfig`].

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Default service name reported to OpenTelemetry
const DEFAULT_SERVICE_NAME: &str = "code-exec-rs";

/// Log line format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Stateful shell and Python sessions served over newline-delimited JSON on stdio
#[derive(Parser, Debug, Clone)]
#[command(name = "code-exec-rs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable diagnostic mode (log to a file in the temp directory)
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase logging verbosity (-v, -vv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Validate the CODE_EXEC_* environment, print the effective settings and exit
    #[arg(long)]
    pub check_config: bool,

    /// OpenTelemetry OTLP endpoint (e.g., http://localhost:4317)
    /// Accepted but ignored when built without the otel feature.
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// OpenTelemetry service name
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SERVICE_NAME)]
    pub otel_service_name: String,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            diagnostic: false,
            log_dir: None,
            log_file: None,
            log_format: LogFormat::Text,
            verbose: 0,
            quiet: false,
            check_config: false,
            otel_endpoint: None,
            otel_service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl Cli {
    /// Whether logs go to a file
    ///
    /// True if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Whether OpenTelemetry export is active
    #[cfg(feature = "otel")]
    pub fn is_otel_enabled(&self) -> bool {
        self.otel_endpoint.is_some()
    }

    /// Whether OpenTelemetry export is active (always false without the otel feature)
    #[cfg(not(feature = "otel"))]
    pub fn is_otel_enabled(&self) -> bool {
        false
    }

    /// Log level from `-q` / `-v` flags
    ///
    /// - `--quiet`: ERROR
    /// - default: INFO
    /// - `-v`: DEBUG
    /// - `-vv` or more: TRACE
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Log file path for diagnostic mode
    ///
    /// Defaults to `code-exec-rs-{timestamp}.log` in the system temp directory.
    pub fn log_path(&self) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("code-exec-rs-{timestamp}.log")
        });

        dir.join(filename)
    }
}
