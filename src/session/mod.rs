//! Session management for the execution engine
//!
//! This module handles:
//! - Spawning shell and interpreter subprocesses
//! - Pumping and buffering their output
//! - Deciding when a submitted command has finished
//! - Mapping caller-supplied ids to live sessions

mod detector;
mod manager;
mod output_buffer;
mod prompt;
#[allow(clippy::module_inception)]
mod session;
mod stream;
mod wrapped_child;

pub use detector::{ActivityProbe, CompletionDetector, CompletionState, Termination};
pub use manager::SessionManager;
pub use output_buffer::OutputBuffer;
pub use prompt::{
    DIALOG_TAIL_LINES, PROMPT_TAIL_LINES, PromptClassifier, RegexPromptClassifier,
    ends_with_dialog, ends_with_shell_prompt,
};
pub use session::{
    ExecutionOutcome, POLL_INTERVAL, Session, SessionId, SessionKind, SessionStatus,
};
pub use stream::StreamReader;
pub use wrapped_child::WrappedChild;
