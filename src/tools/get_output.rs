//! get_output tool: poll a session for output produced since the last poll

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::base::Tool;
use super::registry::{ToolContext, ToolResult};

/// get_output tool implementation
#[derive(Debug, Default)]
pub struct GetOutputTool;

#[derive(Debug, Deserialize)]
struct GetOutputInput {
    #[serde(default)]
    session: i64,
}

#[async_trait]
impl Tool for GetOutputTool {
    fn name(&self) -> &str {
        "get_output"
    }

    fn description(&self) -> &str {
        "Get output accumulated in a session since the previous get_output call, without \
         running anything. Use it to follow commands that exceeded the execution timeout."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Session number to read output from"
                }
            }
        })
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> ToolResult {
        let params: GetOutputInput = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid input: {e}")),
        };

        ToolResult::success(context.engine().get_output(params.session).await)
    }
}
