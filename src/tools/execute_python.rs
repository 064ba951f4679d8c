//! execute_python tool: run code in a persistent interpreter session

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::base::Tool;
use super::registry::{ToolContext, ToolResult};

/// execute_python tool implementation
#[derive(Debug, Default)]
pub struct ExecutePythonTool;

#[derive(Debug, Deserialize)]
struct ExecutePythonInput {
    code: String,
    #[serde(default)]
    session: i64,
}

#[async_trait]
impl Tool for ExecutePythonTool {
    fn name(&self) -> &str {
        "execute_python"
    }

    fn description(&self) -> &str {
        "Execute Python code in the specified interpreter session. Variables, imports and \
         definitions persist between calls to the same session. Use print() to produce output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute"
                },
                "session": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Session number for maintaining separate Python contexts"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> ToolResult {
        let params: ExecutePythonInput = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid input: {e}")),
        };

        ToolResult::success(
            context
                .engine()
                .execute_code(params.session, &params.code)
                .await,
        )
    }
}
