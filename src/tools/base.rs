//! Base tool trait definition

use async_trait::async_trait;

use super::registry::{ToolContext, ToolResult};

/// Tool trait for the engine's caller-facing operations
///
/// Each tool validates its JSON input and delegates to one engine operation.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's input parameters
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input
    async fn execute(&self, input: serde_json::Value, context: &ToolContext) -> ToolResult;
}
