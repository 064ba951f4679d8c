//! Error tracing extensions
//!
//! Logs engine errors together with their code and source chain before they
//! are flattened into caller-facing text.

use crate::types::EngineError;
use std::error::Error as StdError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log error with its code, classification and error chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for EngineError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();
        let is_client_error = self.is_client_error();

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        if self.is_soft() || is_client_error {
            tracing::warn!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                is_client_error,
                "Request failed"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                is_client_error,
                error_chain_len = error_chain.len(),
                error_chain = ?error_chain,
                "Error occurred with full context"
            );
        }

        self
    }
}

/// Extension trait for Result types
pub trait ResultTraceExt<T, E>: Sized {
    /// Convert error to EngineError and log with context
    fn trace_context(self) -> Result<T, EngineError>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultTraceExt<T, E> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
    EngineError: From<E>,
{
    fn trace_context(self) -> Result<T, EngineError> {
        self.map_err(|e| {
            let engine_error = EngineError::from(e);
            engine_error.trace_error();
            engine_error
        })
    }
}
