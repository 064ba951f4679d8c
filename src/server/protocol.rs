//! Newline-delimited JSON request/response framing
//!
//! One request per input line, one response per output line:
//!
//! ```text
//! -> {"id":1,"method":"tools/list"}
//! <- {"id":1,"result":{"tools":[...]}}
//! -> {"id":2,"method":"tools/call","name":"execute_terminal","arguments":{"command":"ls"}}
//! <- {"id":2,"result":{"content":[{"type":"text","text":"..."}],"isError":false}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tools::{ToolContext, ToolRegistry};
use crate::tracing::ResultTraceExt;
use crate::types::{ErrorCode, Result};

/// Incoming request
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Echoed back in the response
    #[serde(default)]
    pub id: Value,
    /// `tools/list` or `tools/call`
    pub method: String,
    /// Tool name for `tools/call`
    #[serde(default)]
    pub name: Option<String>,
    /// Tool arguments for `tools/call`
    #[serde(default)]
    pub arguments: Value,
}

impl Request {
    /// Parse one input line
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).trace_context()
    }
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code
    pub code: i32,
    /// Human readable message
    pub message: String,
}

/// Outgoing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers (null if it could not be parsed)
    pub id: Value,
    /// Success payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Create a success response
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorObject {
                code: code.code(),
                message: message.into(),
            }),
        }
    }
}

/// Handle one raw input line
pub async fn handle_line(line: &str, registry: &ToolRegistry, context: &ToolContext) -> Response {
    match Request::parse(line) {
        Ok(request) => dispatch(request, registry, context).await,
        Err(e) => Response::error(Value::Null, ErrorCode::ParseError, e.to_string()),
    }
}

/// Route a parsed request
pub async fn dispatch(request: Request, registry: &ToolRegistry, context: &ToolContext) -> Response {
    match request.method.as_str() {
        "tools/list" => Response::result(request.id, json!({ "tools": registry.schemas() })),
        "tools/call" => {
            let Some(name) = request.name else {
                return Response::error(request.id, ErrorCode::InvalidParams, "missing tool name");
            };
            let result = registry.execute(&name, request.arguments, context).await;
            Response::result(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": result.content }],
                    "isError": result.is_error,
                }),
            )
        }
        other => {
            tracing::warn!(method = %other, "Received unknown method");
            Response::error(
                request.id,
                ErrorCode::MethodNotFound,
                format!("Unknown method: {other}"),
            )
        }
    }
}
