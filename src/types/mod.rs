//! Public types for the execution engine
//!
//! This module contains the shared configuration and error types.

mod config;
mod error;

pub use config::{
    ENV_BETWEEN_OUTPUT_TIMEOUT, ENV_DIALOG_TIMEOUT, ENV_EXECUTABLE, ENV_FIRST_OUTPUT_TIMEOUT,
    ENV_INIT_COMMANDS, ENV_INTERPRETER, ENV_MAX_EXEC_TIMEOUT, EngineConfig, Timeouts,
};
pub use error::{EngineError, ErrorCode, Result};
