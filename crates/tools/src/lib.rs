//! Agent tools and the orchestrator that runs them for ForgeLoop.
//!
//! Agent-facing tools:
//! - `read_file`, `write_file`, `list_directory`, `delete_file`
//! - `execute_command` (with `cd` handling, script resolution, and
//!   dev-server routing)
//! - `create_terminal`, `send_terminal_text`, `read_terminal`, `kill_terminal`
//!
//! Each tool forwards to a [`ToolServer`](forgeloop_core::ToolServer):
//! [`LocalToolServer`] in-process or [`HttpToolServer`] over the network.

pub mod command;
pub mod fs;
pub mod orchestrator;
pub mod server;
pub mod shell;
pub mod terminal;

pub use orchestrator::{ExecuteOptions, OrchestratorSettings, ToolOrchestrator};
pub use server::{HttpToolServer, LocalToolServer};

use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{ToolContext, ToolRegistry, ToolResult, ToolServerRequest, ToolServerResponse};
use serde_json::Value;

/// Create a registry with every built-in agent tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(fs::ServerTool::read_file()));
    registry.register(Box::new(fs::ServerTool::write_file()));
    registry.register(Box::new(fs::ServerTool::list_directory()));
    registry.register(Box::new(fs::ServerTool::delete_file()));
    registry.register(Box::new(shell::ExecuteCommandTool));
    registry.register(Box::new(terminal::CreateTerminalTool));
    registry.register(Box::new(terminal::SendTerminalTextTool));
    registry.register(Box::new(terminal::ReadTerminalTool));
    registry.register(Box::new(terminal::KillTerminalTool));
    registry
}

pub(crate) fn require_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Send `parameters` to `server_tool`, bound to the context's working directory.
pub(crate) async fn call_server(
    ctx: &ToolContext,
    server_tool: &str,
    parameters: Value,
) -> Result<ToolServerResponse, ToolError> {
    let mut parameters = match parameters {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "arguments must be a JSON object, got {other}"
            )));
        }
    };
    let root = Value::String(ctx.working_dir.to_string_lossy().into_owned());
    parameters.insert("cwd".into(), root.clone());
    parameters.insert(server::WORKSPACE_ROOT.into(), root);
    ctx.server
        .execute(ToolServerRequest::new(server_tool, Value::Object(parameters)))
        .await
}

/// Turn a server reply into what the model sees.
pub(crate) fn into_tool_result(response: ToolServerResponse) -> ToolResult {
    if !response.success {
        return ToolResult::failure(
            response
                .error
                .unwrap_or_else(|| "tool server reported failure".into()),
        );
    }

    let output = match &response.result {
        Value::Null => "OK".to_string(),
        Value::String(text) => text.clone(),
        result => ["content", "output"]
            .iter()
            .find_map(|key| result.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| {
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            }),
    };
    ToolResult::ok(output).with_data(response.result)
}

#[cfg(test)]
pub(crate) mod test_helpers;
