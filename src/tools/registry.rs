//! Tool registry for dispatching calls by name

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Tool;
use super::{ExecutePythonTool, ExecuteTerminalTool, GetOutputTool, ResetTerminalTool};
use crate::engine::CodeExecutionEngine;

/// Tool execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Result status
    pub status: ToolStatus,
    /// Output content
    pub content: String,
    /// Whether this is an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            content: message.into(),
            is_error: true,
        }
    }
}

/// Tool execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Tool executed and produced text
    Success,
    /// Tool input was rejected or the tool is unknown
    Error,
}

/// Tool execution context
#[derive(Debug, Clone)]
pub struct ToolContext {
    engine: Arc<CodeExecutionEngine>,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(engine: Arc<CodeExecutionEngine>) -> Self {
        Self { engine }
    }

    /// Get the execution engine
    pub fn engine(&self) -> &CodeExecutionEngine {
        &self.engine
    }
}

/// Tool registry for managing available tools
#[derive(Debug, Default)]
pub struct ToolRegistry {
    /// Registered tools by name
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry holding the four execution tools
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(ExecuteTerminalTool);
        registry.register(ExecutePythonTool);
        registry.register(GetOutputTool);
        registry.register(ResetTerminalTool);
        registry
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    ///
    /// A missing or null argument object is treated as `{}` so tools whose
    /// parameters all have defaults can be called bare.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        context: &ToolContext,
    ) -> ToolResult {
        let input = if input.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            input
        };

        match self.get(name) {
            Some(tool) => tool.execute(input, context).await,
            None => ToolResult::error(format!("Tool not found: {name}")),
        }
    }

    /// Get tool schemas for all registered tools
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }
}

/// Tool schema for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for input
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngineConfig;
    use serde_json::json;

    fn context() -> ToolContext {
        ToolContext::new(Arc::new(CodeExecutionEngine::new(EngineConfig::default())))
    }

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("Hello, World!");
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.content, "Hello, World!");
        assert!(!result.is_error);
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("Something went wrong");
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.is_error);
    }

    #[test]
    fn test_registry_new() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_default_tools() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(
            registry.names(),
            vec!["execute_python", "execute_terminal", "get_output", "reset_terminal"]
        );
        assert!(registry.contains("get_output"));

        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 4);
        let terminal = schemas.iter().find(|s| s.name == "execute_terminal").unwrap();
        assert_eq!(terminal.input_schema["required"], json!(["command"]));

        let listed = serde_json::to_value(&schemas[0]).unwrap();
        assert!(listed.get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::with_default_tools();
        let result = registry.execute("Bash", json!({}), &context()).await;
        assert!(result.is_error);
        assert_eq!(result.content, "Tool not found: Bash");
    }

    #[tokio::test]
    async fn test_null_arguments_use_defaults() {
        let registry = ToolRegistry::with_default_tools();
        let result = registry
            .execute("get_output", serde_json::Value::Null, &context())
            .await;
        assert!(!result.is_error);
        assert!(result.content.starts_with("Error getting terminal output"));
    }
}
