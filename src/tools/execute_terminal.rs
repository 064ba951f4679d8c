//! execute_terminal tool: run a shell command in a persistent session

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::base::Tool;
use super::registry::{ToolContext, ToolResult};

/// execute_terminal tool implementation
#[derive(Debug, Default)]
pub struct ExecuteTerminalTool;

/// Input parameters for execute_terminal
#[derive(Debug, Deserialize)]
struct ExecuteTerminalInput {
    /// The shell command to execute
    command: String,
    /// Session number
    #[serde(default)]
    session: i64,
}

#[async_trait]
impl Tool for ExecuteTerminalTool {
    fn name(&self) -> &str {
        "execute_terminal"
    }

    fn description(&self) -> &str {
        "Execute a terminal command in the specified session. Sessions are persistent shells: \
         working directory, environment variables and background jobs survive between calls. \
         Returns the command output once it stops producing output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "session": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Session number for maintaining separate shell contexts"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> ToolResult {
        let params: ExecuteTerminalInput = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid input: {e}")),
        };

        ToolResult::success(
            context
                .engine()
                .execute_terminal_command(params.session, &params.command)
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
    async fn test_missing_command_is_rejected() {
        let context = ToolContext::new(Arc::new(CodeExecutionEngine::new(EngineConfig::default())));
        let result = ExecuteTerminalTool
            .execute(json!({"session": 0}), &context)
            .await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Invalid input"));
    }
}
