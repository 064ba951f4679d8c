//! Tool surface over the execution engine

mod base;
mod execute_python;
mod execute_terminal;
mod get_output;
mod registry;
mod reset_terminal;

pub use base::Tool;
pub use execute_python::ExecutePythonTool;
pub use execute_terminal::ExecuteTerminalTool;
pub use get_output::GetOutputTool;
pub use registry::{ToolContext, ToolRegistry, ToolResult, ToolSchema, ToolStatus};
pub use reset_terminal::ResetTerminalTool;
