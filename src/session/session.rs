//! A single execution session
//!
//! Each session owns one long-lived subprocess (a shell, or an interpreter
//! launched through the shell), the reader pumping its output, and the
//! execution state of the command currently in flight.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::detector::{ActivityProbe, CompletionDetector, CompletionState, Termination};
use super::output_buffer::OutputBuffer;
use super::prompt::{PromptClassifier, ends_with_shell_prompt};
use super::stream::StreamReader;
use crate::types::{EngineConfig, EngineError, Result};

/// Interval between two reads of the output stream
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settle period granted to every init command
const INIT_COMMAND_SETTLE: Duration = Duration::from_millis(500);

/// Written first into every shell so stderr keeps its order relative to stdout
const SHELL_BOOTSTRAP: &str = "exec 2>&1";

/// Prompt printed by an idle interpreter
const REPL_PROMPT: &str = ">>> ";

/// Grace period for output still in the pipe when a process exits
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Characters of final output kept in a `ProcessDead` detail
const DEAD_OUTPUT_TAIL: usize = 2000;

/// Installed into every interpreter; runs submitted code as one unit and
/// echoes the value of a trailing expression the way the REPL would
const INTERPRETER_HELPER: &str = r#"
def __code_exec_run(source, filename):
    import ast
    tree = ast.parse(source, filename)
    tail = tree.body[-1:] if tree.body and isinstance(tree.body[-1], ast.Expr) else []
    body = tree.body[:len(tree.body) - len(tail)]
    exec(compile(ast.Module(body, []), filename, "exec"), globals())
    if tail:
        exec(compile(ast.Interactive(tail), filename, "single"), globals())
"#;

/// Caller-supplied session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    /// Create a session id
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Numeric value
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for SessionId {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self> {
        u32::try_from(value).map(Self).map_err(|_| {
            EngineError::invalid_session(format!(
                "session id must be a non-negative integer no larger than {}, got {value}",
                u32::MAX
            ))
        })
    }
}

/// What runs behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// A command shell
    Shell,
    /// A persistent code interpreter
    Interpreter,
}

impl SessionKind {
    /// Prefix used when previewing submitted input in logs
    pub fn preview_prefix(self) -> &'static str {
        match self {
            Self::Shell => "bash> ",
            Self::Interpreter => "python> ",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => f.write_str("shell"),
            Self::Interpreter => f.write_str("interpreter"),
        }
    }
}

/// Result of one submission
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Why waiting stopped
    pub termination: Termination,
    /// Output produced by this command only
    pub transcript: String,
    /// Time from submission to the terminal state
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    /// Terminal completion state
    pub fn state(&self) -> CompletionState {
        self.termination.state()
    }
}

/// Snapshot of a session's execution state
#[derive(Debug, Clone, Copy)]
pub struct SessionStatus {
    /// State of the latest command
    pub state: CompletionState,
    /// When the latest command was submitted
    pub command_started: Option<Instant>,
    /// When the latest output chunk arrived
    pub last_output: Option<Instant>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        // No command submitted yet
        Self {
            state: CompletionState::Done,
            command_started: None,
            last_output: None,
        }
    }
}

/// An execution session
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    kind: SessionKind,
    config: Arc<EngineConfig>,
    classifier: Arc<dyn PromptClassifier>,
    output: Arc<OutputBuffer>,
    stream: StreamReader,
    /// Serialises submissions; tokio's mutex is fair, so waiters run in order
    in_flight: tokio::sync::Mutex<()>,
    status: Mutex<SessionStatus>,
    broken: AtomicBool,
    reset: CancellationToken,
}

impl Session {
    /// Spawn the subprocess and bring it to a ready state
    ///
    /// Shell sessions replay the configured init commands; interpreter
    /// sessions wait for the interpreter's first prompt.
    pub async fn spawn(
        id: SessionId,
        kind: SessionKind,
        config: Arc<EngineConfig>,
        classifier: Arc<dyn PromptClassifier>,
    ) -> Result<Self> {
        let output = Arc::new(OutputBuffer::new());
        let args = match kind {
            SessionKind::Shell => Vec::new(),
            SessionKind::Interpreter => {
                vec!["-c".to_string(), format!("exec {} 2>&1", config.interpreter)]
            }
        };
        let stream = StreamReader::spawn(id, &config.executable, &args, output.clone())?;

        let session = Self {
            id,
            kind,
            config,
            classifier,
            output,
            stream,
            in_flight: tokio::sync::Mutex::new(()),
            status: Mutex::new(SessionStatus::default()),
            broken: AtomicBool::new(false),
            reset: CancellationToken::new(),
        };

        let ready = match kind {
            SessionKind::Shell => session.replay_init_commands().await,
            SessionKind::Interpreter => session.start_interpreter().await,
        };
        if let Err(e) = ready {
            session.terminate().await;
            return Err(e);
        }

        // Startup noise stays in the transcript but is never reported
        session.output.mark_drained().await;
        session.stream.skip_to_end().await;

        tracing::info!(
            session = %id,
            kind = %kind,
            pid = session.stream.pid(),
            "Session ready"
        );
        Ok(session)
    }

    async fn replay_init_commands(&self) -> Result<()> {
        self.stream.write(SHELL_BOOTSTRAP).await?;
        for command in &self.config.init_commands {
            tracing::debug!(session = %self.id, command = %command, "Replaying init command");
            self.stream.write(command).await?;
            tokio::time::sleep(INIT_COMMAND_SETTLE).await;
        }
        Ok(())
    }

    async fn start_interpreter(&self) -> Result<()> {
        self.wait_for_interpreter_prompt().await?;
        let helper = serde_json::to_string(INTERPRETER_HELPER)?;
        self.stream
            .write(&format!("exec(compile({helper}, \"<code-exec>\", \"exec\"))"))
            .await?;
        self.wait_for_interpreter_prompt().await
    }

    async fn wait_for_interpreter_prompt(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.timeouts.max_exec;
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            let chunk = self.stream.read_available(POLL_INTERVAL).await;
            if chunk.is_empty() {
                if !self.stream.is_alive() {
                    let startup = String::from_utf8_lossy(&seen);
                    return Err(EngineError::process_dead(
                        self.id,
                        format!(
                            "interpreter exited during startup ({}): {}",
                            self.stream.exit_detail(),
                            startup.trim()
                        ),
                    ));
                }
                continue;
            }
            seen.extend_from_slice(&chunk);
            if seen.ends_with(REPL_PROMPT.as_bytes())
                || ends_with_shell_prompt(self.classifier.as_ref(), &String::from_utf8_lossy(&seen))
            {
                return Ok(());
            }
        }
        Err(EngineError::process_dead(
            self.id,
            "interpreter never printed its prompt",
        ))
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Session kind
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Process id of the session subprocess
    pub fn pid(&self) -> u32 {
        self.stream.pid()
    }

    /// Whether the subprocess died and the session needs a reset
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    /// Current execution state
    pub fn status(&self) -> SessionStatus {
        *self.lock_status()
    }

    /// Submit a command (shell) or code (interpreter) and wait for completion
    ///
    /// Waits behind any command already in flight. Returns the output this
    /// command produced together with the reason waiting stopped; a
    /// timed-out command keeps running and its later output can be polled.
    pub async fn submit(&self, input: &str) -> Result<ExecutionOutcome> {
        let _turn = tokio::select! {
            biased;
            () = self.reset.cancelled() => return Err(EngineError::SessionReset(self.id)),
            guard = self.in_flight.lock() => guard,
        };

        if self.is_broken() {
            return Err(EngineError::process_dead(
                self.id,
                self.stream.exit_detail(),
            ));
        }

        let line = match self.kind {
            SessionKind::Shell => input.to_string(),
            SessionKind::Interpreter => interpreter_line(self.id, input)?,
        };

        // Output of earlier timed-out commands does not belong to this one
        self.stream.skip_to_end().await;

        let started = Instant::now();
        *self.lock_status() = SessionStatus {
            state: CompletionState::AwaitingFirstOutput,
            command_started: Some(started),
            last_output: None,
        };

        let written = tokio::select! {
            biased;
            () = self.reset.cancelled() => return Err(EngineError::SessionReset(self.id)),
            written = self.stream.write(&line) => written,
        };
        if let Err(e) = written {
            self.mark_broken();
            return Err(e);
        }

        let mut detector =
            CompletionDetector::new(self.config.timeouts, self.classifier.as_ref(), started);
        if self.kind == SessionKind::Interpreter {
            detector = detector.with_prompt_suffix(REPL_PROMPT);
        }

        let termination = loop {
            let chunk = tokio::select! {
                biased;
                () = self.reset.cancelled() => return Err(EngineError::SessionReset(self.id)),
                chunk = self.stream.read_available(POLL_INTERVAL) => chunk,
            };

            if chunk.is_empty() && !self.stream.is_alive() {
                let rest = self.stream.read_remaining(EXIT_DRAIN_GRACE).await;
                return Err(self.died_with_output(detector.transcript(), &rest));
            }

            let now = Instant::now();
            let outcome = detector.observe(&chunk, now, self);
            self.record_tick(detector.state(), (!chunk.is_empty()).then_some(now));

            if let Some(termination) = outcome {
                break termination;
            }
        };

        let elapsed = started.elapsed();
        let mut transcript = String::from_utf8_lossy(&detector.into_transcript()).into_owned();
        if self.kind == SessionKind::Interpreter {
            transcript = strip_trailing_prompt(&transcript).to_string();
        }

        tracing::debug!(
            session = %self.id,
            state = %termination.state(),
            termination = ?termination,
            elapsed_ms = elapsed.as_millis(),
            bytes = transcript.len(),
            "Command reached terminal state"
        );

        Ok(ExecutionOutcome {
            termination,
            transcript,
            elapsed,
        })
    }

    /// Output accumulated since the previous poll
    ///
    /// Never submits anything and never waits for the command in flight.
    pub async fn poll(&self) -> String {
        self.output.drain_new().await
    }

    /// Kill the subprocess and fail every waiter with `SessionReset`
    pub async fn terminate(&self) {
        self.reset.cancel();
        self.stream.terminate().await;
        self.output.clear().await;
        tracing::debug!(session = %self.id, "Session terminated");
    }

    fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                session = %self.id,
                detail = %self.stream.exit_detail(),
                "Session process died, reset required"
            );
        }
    }

    /// Mark the session broken, keeping whatever the process printed last
    fn died_with_output(&self, seen: &[u8], rest: &[u8]) -> EngineError {
        self.mark_broken();

        let mut output = String::from_utf8_lossy(seen).into_owned();
        output.push_str(&String::from_utf8_lossy(rest));
        let output = output.trim();

        let detail = self.stream.exit_detail();
        if output.is_empty() {
            return EngineError::process_dead(self.id, detail);
        }
        let skip = output.chars().count().saturating_sub(DEAD_OUTPUT_TAIL);
        let tail: String = output.chars().skip(skip).collect();
        EngineError::process_dead(self.id, format!("{detail}; last output: {tail}"))
    }

    fn record_tick(&self, state: CompletionState, output_at: Option<Instant>) {
        let mut status = self.lock_status();
        status.state = state;
        if output_at.is_some() {
            status.last_output = output_at;
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, SessionStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActivityProbe for Session {
    fn is_busy(&self) -> bool {
        match self.kind {
            SessionKind::Shell => self.stream.is_busy(),
            // The interpreter always prints a prompt when it is done
            SessionKind::Interpreter => self.stream.is_alive(),
        }
    }
}

/// Encode code as one interpreter line handed to the installed helper
///
/// A JSON string is also a valid Python string literal.
fn interpreter_line(id: SessionId, code: &str) -> Result<String> {
    let source = serde_json::to_string(code)?;
    let filename = serde_json::to_string(&format!("<session-{id}>"))?;
    Ok(format!("__code_exec_run({source}, {filename})"))
}

/// Drop the REPL prompt echoed after the command finished
fn strip_trailing_prompt(text: &str) -> &str {
    text.trim_end_matches(' ')
        .strip_suffix(">>>")
        .unwrap_or(text)
}
