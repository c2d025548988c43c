//! Tool trait: the abstraction over agent capabilities.
//!
//! Agent-facing tools (read_file, execute_command, create_terminal, ...) are
//! registered by name in a [`ToolRegistry`]. Each tool forwards its work to a
//! [`ToolServer`], the backing execution endpoint that accepts
//! `{tool, parameters}` requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToolError;
use crate::terminal::TerminalRegistry;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (or the error text when `success` is false)
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: error.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A request to the backing tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerRequest {
    pub tool: String,
    pub parameters: serde_json::Value,
}

impl ToolServerRequest {
    pub fn new(tool: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
        }
    }
}

/// A tool server reply.
///
/// `success == false` is a tool-level failure (file missing, non-zero exit
/// code reported as failure); transport problems are `Err(ToolError)` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolServerResponse {
    pub success: bool,

    #[serde(default)]
    pub result: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolServerResponse {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// The backing execution endpoint.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;

    /// Server-side tool names this server can execute.
    fn capabilities(&self) -> Vec<String>;

    async fn execute(&self, request: ToolServerRequest) -> Result<ToolServerResponse, ToolError>;
}

/// Everything a tool needs to run one call.
#[derive(Clone)]
pub struct ToolContext {
    /// Directory the call is bound to.
    pub working_dir: PathBuf,
    pub server: Arc<dyn ToolServer>,
    pub terminals: Arc<TerminalRegistry>,
    /// Upper bound for synchronous command execution.
    pub command_timeout: Duration,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "execute_command").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Tool server capabilities this tool dispatches to.
    fn required_capabilities(&self) -> &[&'static str];

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;
}

/// A registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Look up a tool, failing with a typed error for unknown names.
    pub fn require(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Check that `server` can back every registered tool.
    pub fn validate_against(&self, server: &dyn ToolServer) -> Result<(), ToolError> {
        let offered = server.capabilities();
        for tool in self.tools.values() {
            for capability in tool.required_capabilities() {
                if !offered.iter().any(|c| c == capability) {
                    return Err(ToolError::Unsupported {
                        tool_name: tool.name().to_string(),
                        capability: (*capability).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// A plain-text tool catalogue for the system prompt.
    pub fn catalogue(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}\n  parameters: {}", t.name(), t.description(), t.parameters_schema()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
