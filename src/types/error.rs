//! Error types for the execution engine

use std::time::Duration;

use thiserror::Error;

use crate::session::{SessionId, SessionKind};

/// Structured error codes
///
/// JSON-RPC style codes so a structured transport can surface them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Parse error: Invalid JSON
    ParseError = -32700,
    /// Method not found
    MethodNotFound = -32601,
    /// Invalid params
    InvalidParams = -32602,
    /// Internal error
    InternalError = -32603,

    /// Session process is gone
    ProcessDead = -32001,
    /// Session id bound to another session kind
    SessionKindMismatch = -32002,
    /// Unknown or malformed session id
    InvalidSession = -32003,
    /// Command outlived the max execution timeout
    MaxTimeoutExceeded = -32004,
    /// In-flight wait invalidated by a reset
    SessionReset = -32005,
    /// Command is waiting on interactive input
    DialogPending = -32006,
    /// Configuration error
    ConfigError = -32010,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Main error type for the execution engine
#[derive(Debug, Error)]
pub enum EngineError {
    // === Session errors ===
    /// The session's subprocess exited; the session must be reset before reuse
    #[error("Session {session} process is not running ({detail}); reset the session before reuse")]
    ProcessDead { session: SessionId, detail: String },

    /// The id is already bound to a session of another kind
    #[error("Session {session} is bound to a {existing} session, not {requested}")]
    SessionKindMismatch {
        session: SessionId,
        existing: SessionKind,
        requested: SessionKind,
    },

    /// Malformed id, or unknown id where an existing session is required
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The waiter was invalidated by a concurrent reset
    #[error("Session {0} was reset while the command was in flight")]
    SessionReset(SessionId),

    // === Soft conditions (partial output is still returned) ===
    /// Command still running at the absolute ceiling
    #[error("Command exceeded the maximum execution time of {} seconds", .0.as_secs_f64())]
    MaxTimeoutExceeded(Duration),

    /// Output stopped on what looks like an interactive prompt
    #[error("Output paused for {} seconds on what looks like an interactive prompt", .0.as_secs_f64())]
    DialogPending(Duration),

    // === Configuration errors ===
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // === External errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic errors ===
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for the execution engine
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Get the structured error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            EngineError::ProcessDead { .. } => ErrorCode::ProcessDead,
            EngineError::SessionKindMismatch { .. } => ErrorCode::SessionKindMismatch,
            EngineError::InvalidSession(_) => ErrorCode::InvalidSession,
            EngineError::SessionReset(_) => ErrorCode::SessionReset,
            EngineError::MaxTimeoutExceeded(_) => ErrorCode::MaxTimeoutExceeded,
            EngineError::DialogPending(_) => ErrorCode::DialogPending,
            EngineError::Config(_) => ErrorCode::ConfigError,
            EngineError::Io(_) => ErrorCode::InternalError,
            EngineError::Json(_) => ErrorCode::ParseError,
            EngineError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Soft conditions come with partial output and leave the session usable
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            EngineError::MaxTimeoutExceeded(_) | EngineError::DialogPending(_)
        )
    }

    /// Check if this error is a client error (caused by invalid input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidSession(_)
                | EngineError::SessionKindMismatch { .. }
                | EngineError::Json(_)
        )
    }

    // === Constructor helpers ===

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Create an invalid session error
    pub fn invalid_session(msg: impl Into<String>) -> Self {
        EngineError::InvalidSession(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    /// Create a process dead error
    pub fn process_dead(session: SessionId, detail: impl Into<String>) -> Self {
        EngineError::ProcessDead {
            session,
            detail: detail.into(),
        }
    }
}
