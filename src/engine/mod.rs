//! Execution engine facade
//!
//! The four caller-facing operations. Each one resolves a session through the
//! [`SessionManager`], delegates, and turns the outcome or error into text;
//! every operation returns a string, never an error.

pub mod format;

use std::sync::Arc;

use crate::session::{ExecutionOutcome, SessionId, SessionKind, SessionManager, Termination};
use crate::tracing::ErrorTraceExt;
use crate::types::{EngineConfig, EngineError, Result, Timeouts};

use format::{format_command_for_output, render_transcript};

/// Text returned for a finished command that printed nothing
pub const NO_OUTPUT: &str = "(no output)";

/// Code execution engine
///
/// Owns the session manager for the lifetime of the process and is shared
/// across all request handlers.
#[derive(Debug)]
pub struct CodeExecutionEngine {
    sessions: Arc<SessionManager>,
}

impl CodeExecutionEngine {
    /// Create an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self::with_manager(Arc::new(SessionManager::new(config)))
    }

    /// Create an engine with configuration from environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(EngineConfig::from_env()?))
    }

    /// Create an engine over an existing session manager
    pub fn with_manager(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Get the session manager
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Get engine name for logging
    pub fn name(&self) -> &'static str {
        "code-exec-rs"
    }

    /// Get engine version
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Run a shell command in session `session`
    #[tracing::instrument(skip(self, command))]
    pub async fn execute_terminal_command(&self, session: i64, command: &str) -> String {
        self.execute(session, SessionKind::Shell, command)
            .await
            .unwrap_or_else(|e| error_text("Error executing terminal command", &e))
    }

    /// Run a code snippet in interpreter session `session`
    #[tracing::instrument(skip(self, code))]
    pub async fn execute_code(&self, session: i64, code: &str) -> String {
        self.execute(session, SessionKind::Interpreter, code)
            .await
            .unwrap_or_else(|e| error_text("Error executing Python code", &e))
    }

    /// Output accumulated in session `session` since the previous call
    ///
    /// Does not wait for a command in flight; fails if the session does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_output(&self, session: i64) -> String {
        self.poll(session)
            .await
            .unwrap_or_else(|e| error_text("Error getting terminal output", &e))
    }

    /// Terminate session `session`; it is recreated on next use
    #[tracing::instrument(skip(self))]
    pub async fn reset_session(&self, session: i64, reason: Option<&str>) -> String {
        let id = match SessionId::try_from(session) {
            Ok(id) => id,
            Err(e) => return error_text("Error resetting terminal", &e),
        };
        self.sessions.reset(id, reason).await;
        format!("[SYSTEM: Terminal session {id} has been reset.]")
    }

    /// Terminate every session
    pub async fn shutdown(&self) {
        self.sessions.teardown().await;
    }

    async fn execute(&self, session: i64, kind: SessionKind, input: &str) -> Result<String> {
        let id = SessionId::try_from(session)?;
        let session = self.sessions.get_or_create(id, kind).await?;

        tracing::info!(
            session = %id,
            "{}{}",
            kind.preview_prefix(),
            format_command_for_output(input)
        );

        let outcome = session.submit(input).await?;
        Ok(render_outcome(&outcome, &self.sessions.config().timeouts))
    }

    async fn poll(&self, session: i64) -> Result<String> {
        let id = SessionId::try_from(session)?;
        let session = self.sessions.get(id).await?;

        let status = session.status();
        tracing::debug!(
            session = %id,
            state = %status.state,
            in_flight = !status.state.is_terminal(),
            command_age_ms = ?status.command_started.map(|at| at.elapsed().as_millis()),
            quiet_ms = ?status.last_output.map(|at| at.elapsed().as_millis()),
            "Polling session output"
        );

        let text = render_transcript(&session.poll().await);
        if text.is_empty() && session.is_broken() {
            return Err(EngineError::process_dead(id, "no process to read from"));
        }
        Ok(text)
    }
}

/// Shape a submission outcome into caller text, with a hint for non-final states
fn render_outcome(outcome: &ExecutionOutcome, timeouts: &Timeouts) -> String {
    let text = render_transcript(&outcome.transcript);
    match outcome.termination {
        Termination::MaxTimeout => with_hint(
            text,
            &format!(
                "{}. The process is still running; call get_output to collect further output or reset_session to stop it.",
                EngineError::MaxTimeoutExceeded(timeouts.max_exec)
            ),
        ),
        Termination::Dialog => with_hint(
            text,
            &format!(
                "{}. Send the answer as the next command, or reset_session to abandon it.",
                EngineError::DialogPending(timeouts.dialog)
            ),
        ),
        Termination::Quiescent | Termination::PromptDetected | Termination::NoOutput => {
            if text.is_empty() {
                NO_OUTPUT.to_string()
            } else {
                text
            }
        }
    }
}

fn with_hint(text: String, hint: &str) -> String {
    if text.is_empty() {
        format!("[SYSTEM: {hint}]")
    } else {
        format!("{text}\n\n[SYSTEM: {hint}]")
    }
}

fn error_text(prefix: &str, error: &EngineError) -> String {
    error.trace_error();
    format!("{prefix}: {error}")
}
