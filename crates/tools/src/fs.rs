//! Filesystem tools: thin forwards to the tool server.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolContext, ToolResult};

use crate::server::{DELETE_FILE, LIST_DIRECTORY, READ_FILE, WRITE_FILE};
use crate::{call_server, into_tool_result, require_str};

/// An agent tool that forwards its arguments to one server-side tool.
pub struct ServerTool {
    name: &'static str,
    description: &'static str,
    capability: [&'static str; 1],
    required_args: &'static [&'static str],
    schema: serde_json::Value,
}

impl ServerTool {
    pub fn read_file() -> Self {
        Self {
            name: "read_file",
            description: "Read a text file from the workspace and return its contents.",
            capability: [READ_FILE],
            required_args: &["path"],
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace" }
                },
                "required": ["path"]
            }),
        }
    }

    pub fn write_file() -> Self {
        Self {
            name: "write_file",
            description: "Create or overwrite a file in the workspace. Parent directories are created as needed.",
            capability: [WRITE_FILE],
            required_args: &["path", "content"],
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace" },
                    "content": { "type": "string", "description": "Full file contents" }
                },
                "required": ["path", "content"]
            }),
        }
    }

    pub fn list_directory() -> Self {
        Self {
            name: "list_directory",
            description: "List the entries of a workspace directory.",
            capability: [LIST_DIRECTORY],
            required_args: &[],
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory relative to the workspace (default \".\")" }
                }
            }),
        }
    }

    pub fn delete_file() -> Self {
        Self {
            name: "delete_file",
            description: "Delete a file or directory from the workspace.",
            capability: [DELETE_FILE],
            required_args: &["path"],
            schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace" }
                },
                "required": ["path"]
            }),
        }
    }
}

#[async_trait]
impl Tool for ServerTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn required_capabilities(&self) -> &[&'static str] {
        &self.capability
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        for arg in self.required_args {
            require_str(&arguments, arg)?;
        }
        let response = call_server(ctx, self.capability[0], arguments).await?;
        Ok(into_tool_result(response))
    }
}
