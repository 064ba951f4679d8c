//! code-exec-rs
//!
//! A remote, stateful command execution engine. Callers address numbered
//! sessions; each session is a long-lived shell or Python interpreter whose
//! state (working directory, environment, variables) persists between calls.
//! Because a subprocess never says when a command is finished, completion is
//! inferred from output timing and prompt heuristics.
//!
//! ## Features
//!
//! - Lazily spawned, independently scheduled shell and interpreter sessions
//! - Quiescence-based completion detection with first-output, between-output,
//!   dialog and max-execution timeouts
//! - Interactive-prompt (dialog) detection so a blocked command returns early
//! - Non-blocking polling of output produced after a command timed out
//! - Newline-delimited JSON tool surface on stdio
//!
//! ## Quick Start
//!
//! ```no_run
//! use code_exec::{CodeExecutionEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = CodeExecutionEngine::new(EngineConfig::from_env()?);
//!     println!("{}", engine.execute_terminal_command(0, "echo hello").await);
//!     println!("{}", engine.execute_code(1, "print(6 * 7)").await);
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! - `CODE_EXEC_EXECUTABLE`: shell for shell sessions (default `/bin/bash`)
//! - `CODE_EXEC_INIT_COMMANDS`: `;`-separated commands replayed into every new shell
//! - `CODE_EXEC_INTERPRETER`: interpreter command line (default `python3 -i -q -u`)
//! - `CODE_EXEC_FIRST_OUTPUT_TIMEOUT`: seconds to wait for the first output (default 30)
//! - `CODE_EXEC_BETWEEN_OUTPUT_TIMEOUT`: quiet gap that ends a command (default 15)
//! - `CODE_EXEC_DIALOG_TIMEOUT`: quiet gap after a prompt-looking line (default 5)
//! - `CODE_EXEC_MAX_EXEC_TIMEOUT`: absolute wait ceiling per command (default 180)
//!
//! Timeouts accept integer or decimal seconds. A malformed value is a startup
//! error, never silently replaced by the default.

pub mod cli;
pub mod engine;
pub mod server;
pub mod session;
pub mod tools;
pub mod tracing;
pub mod types;

pub use cli::Cli;
pub use engine::CodeExecutionEngine;
pub use server::{run_with_cli, serve, shutdown_otel};
pub use session::{SessionId, SessionKind, SessionManager};
pub use tools::{ToolContext, ToolRegistry, ToolResult};
pub use types::{EngineConfig, EngineError, Result, Timeouts};
