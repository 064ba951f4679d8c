//! reset_terminal tool: kill a session and start over

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::base::Tool;
use super::registry::{ToolContext, ToolResult};

/// reset_terminal tool implementation
#[derive(Debug, Default)]
pub struct ResetTerminalTool;

#[derive(Debug, Deserialize)]
struct ResetTerminalInput {
    #[serde(default)]
    session: i64,
    /// Only logged
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Tool for ResetTerminalTool {
    fn name(&self) -> &str {
        "reset_terminal"
    }

    fn description(&self) -> &str {
        "Reset a session: terminate its process, including any command still running, and \
         start a fresh one on next use. Use this when a command hangs or the session is broken."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Session number to reset"
                },
                "reason": {
                    "type": ["string", "null"],
                    "description": "Optional reason for the reset"
                }
            }
        })
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> ToolResult {
        let params: ResetTerminalInput = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid input: {e}")),
        };

        ToolResult::success(
            context
                .engine()
                .reset_session(params.session, params.reason.as_deref())
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::CodeExecutionEngine;
    use crate::types::EngineConfig;

    #[tokio::test]
    async fn test_reset_unknown_session_confirms() {
        let context = ToolContext::new(Arc::new(CodeExecutionEngine::new(EngineConfig::default())));
        let result = ResetTerminalTool
            .execute(json!({"session": 4, "reason": "cleanup"}), &context)
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "[SYSTEM: Terminal session 4 has been reset.]");
    }
}
