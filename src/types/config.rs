//! Engine configuration from environment variables

use std::time::Duration;

use super::error::{EngineError, Result};

/// Environment variable: shell executable
pub const ENV_EXECUTABLE: &str = "CODE_EXEC_EXECUTABLE";
/// Environment variable: `;`-separated init commands
pub const ENV_INIT_COMMANDS: &str = "CODE_EXEC_INIT_COMMANDS";
/// Environment variable: interpreter command line
pub const ENV_INTERPRETER: &str = "CODE_EXEC_INTERPRETER";
/// Environment variable: first-output timeout (seconds)
pub const ENV_FIRST_OUTPUT_TIMEOUT: &str = "CODE_EXEC_FIRST_OUTPUT_TIMEOUT";
/// Environment variable: between-output timeout (seconds)
pub const ENV_BETWEEN_OUTPUT_TIMEOUT: &str = "CODE_EXEC_BETWEEN_OUTPUT_TIMEOUT";
/// Environment variable: dialog timeout (seconds)
pub const ENV_DIALOG_TIMEOUT: &str = "CODE_EXEC_DIALOG_TIMEOUT";
/// Environment variable: max execution timeout (seconds)
pub const ENV_MAX_EXEC_TIMEOUT: &str = "CODE_EXEC_MAX_EXEC_TIMEOUT";

const DEFAULT_EXECUTABLE: &str = "/bin/bash";
const DEFAULT_INTERPRETER: &str = "python3 -i -q -u";

/// Completion-detection timeouts
///
/// See [`crate::session::CompletionDetector`] for how each one is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long to wait for the first chunk of output
    pub first_output: Duration,
    /// Quiescence gap after which a command is considered done
    pub between_output: Duration,
    /// Quiescence gap after which a dialog-looking tail is reported
    pub dialog: Duration,
    /// Absolute ceiling measured from command start
    pub max_exec: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            first_output: Duration::from_secs(30),
            between_output: Duration::from_secs(15),
            dialog: Duration::from_secs(5),
            max_exec: Duration::from_secs(180),
        }
    }
}

/// Engine configuration
///
/// Read once at startup and shared read-only by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Shell executable for shell sessions
    /// Environment variable: `CODE_EXEC_EXECUTABLE`
    pub executable: String,

    /// Commands replayed into every freshly spawned shell session
    /// Environment variable: `CODE_EXEC_INIT_COMMANDS` (`;`-separated)
    pub init_commands: Vec<String>,

    /// Interpreter command line, launched through the shell executable
    /// Environment variable: `CODE_EXEC_INTERPRETER`
    pub interpreter: String,

    /// Completion-detection timeouts
    pub timeouts: Timeouts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_EXECUTABLE.to_string(),
            init_commands: Vec::new(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            timeouts: Timeouts::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment
    ///
    /// Reads the following environment variables:
    /// - `CODE_EXEC_EXECUTABLE`: shell executable (default `/bin/bash`)
    /// - `CODE_EXEC_INIT_COMMANDS`: `;`-separated init commands
    /// - `CODE_EXEC_INTERPRETER`: interpreter command (default `python3 -i -q -u`)
    /// - `CODE_EXEC_FIRST_OUTPUT_TIMEOUT`, `CODE_EXEC_BETWEEN_OUTPUT_TIMEOUT`,
    ///   `CODE_EXEC_DIALOG_TIMEOUT`, `CODE_EXEC_MAX_EXEC_TIMEOUT`: seconds
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Timeouts::default();

        let executable = lookup(ENV_EXECUTABLE)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_EXECUTABLE.to_string());

        let interpreter = lookup(ENV_INTERPRETER)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());

        let init_commands = lookup(ENV_INIT_COMMANDS)
            .map(|raw| parse_init_commands(&raw))
            .unwrap_or_default();

        let timeouts = Timeouts {
            first_output: parse_timeout(
                ENV_FIRST_OUTPUT_TIMEOUT,
                lookup(ENV_FIRST_OUTPUT_TIMEOUT),
                defaults.first_output,
            )?,
            between_output: parse_timeout(
                ENV_BETWEEN_OUTPUT_TIMEOUT,
                lookup(ENV_BETWEEN_OUTPUT_TIMEOUT),
                defaults.between_output,
            )?,
            dialog: parse_timeout(
                ENV_DIALOG_TIMEOUT,
                lookup(ENV_DIALOG_TIMEOUT),
                defaults.dialog,
            )?,
            max_exec: parse_timeout(
                ENV_MAX_EXEC_TIMEOUT,
                lookup(ENV_MAX_EXEC_TIMEOUT),
                defaults.max_exec,
            )?,
        };

        if timeouts.dialog >= timeouts.between_output {
            tracing::warn!(
                dialog = ?timeouts.dialog,
                between_output = ?timeouts.between_output,
                "Dialog timeout is not shorter than the between-output timeout, dialogs will be reported as plain completions"
            );
        }

        Ok(Self {
            executable,
            init_commands,
            interpreter,
            timeouts,
        })
    }

    /// Replace the timeouts
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replace the init commands
    pub fn with_init_commands(mut self, commands: Vec<String>) -> Self {
        self.init_commands = commands;
        self
    }
}

/// Split a `;`-separated init command list, dropping blank entries
fn parse_init_commands(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|cmd| !cmd.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a timeout in seconds (integer or decimal)
fn parse_timeout(key: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    let Some(raw) = value else {
        return Ok(default);
    };

    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| EngineError::config(format!("{key}={raw:?} is not a number of seconds")))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(EngineError::config(format!(
            "{key}={raw:?} must be a positive number of seconds"
        )));
    }

    Duration::try_from_secs_f64(secs)
        .map_err(|e| EngineError::config(format!("{key}={raw:?} is out of range: {e}")))
}
