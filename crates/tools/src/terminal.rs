//! Terminal tools. Sessions created here are tracked in the context's
//! [`TerminalRegistry`](forgeloop_core::TerminalRegistry).

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::terminal::TerminalSession;
use forgeloop_core::tool::{Tool, ToolContext, ToolResult};
use serde_json::{Value, json};
use tracing::info;

use crate::server::{TERMINAL_CREATE, TERMINAL_KILL, TERMINAL_READ, TERMINAL_SEND_TEXT};
use crate::{call_server, into_tool_result, require_str};

pub struct CreateTerminalTool;

#[async_trait]
impl Tool for CreateTerminalTool {
    fn name(&self) -> &str {
        "create_terminal"
    }

    fn description(&self) -> &str {
        "Open a persistent terminal session in the workspace. Returns its terminal id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Display name for the terminal" }
            }
        })
    }

    fn required_capabilities(&self) -> &[&'static str] {
        &[TERMINAL_CREATE]
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let name = arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Agent Terminal")
            .to_string();

        let response = call_server(ctx, TERMINAL_CREATE, json!({ "name": name })).await?;
        if !response.success {
            return Ok(into_tool_result(response));
        }

        let Some(id) = response.result.get("terminalId").and_then(Value::as_str) else {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: "tool server did not return a terminal id".into(),
            });
        };

        ctx.terminals
            .insert(TerminalSession::new(id, &name, ctx.working_dir.clone()))
            .await;
        info!(terminal_id = %id, name = %name, "Terminal opened");

        Ok(ToolResult::ok(format!("Opened terminal {id} ({name})"))
            .with_data(json!({ "terminalId": id, "name": name })))
    }
}

pub struct SendTerminalTextTool;

#[async_trait]
impl Tool for SendTerminalTextTool {
    fn name(&self) -> &str {
        "send_terminal_text"
    }

    fn description(&self) -> &str {
        "Type text into a terminal session. A newline is appended unless addNewLine is false."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "terminalId": { "type": "string" },
                "text": { "type": "string" },
                "addNewLine": { "type": "boolean", "default": true }
            },
            "required": ["terminalId", "text"]
        })
    }

    fn required_capabilities(&self) -> &[&'static str] {
        &[TERMINAL_SEND_TEXT]
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let id = require_str(&arguments, "terminalId")?.to_string();
        let text = require_str(&arguments, "text")?.to_string();
        let add_new_line = arguments
            .get("addNewLine")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let response = call_server(
            ctx,
            TERMINAL_SEND_TEXT,
            json!({ "terminalId": id, "text": text, "addNewLine": add_new_line }),
        )
        .await?;

        if response.success {
            ctx.terminals.set_command(&id, text.clone()).await;
            return Ok(ToolResult::ok(format!("Sent `{text}` to terminal {id}")));
        }
        Ok(into_tool_result(response))
    }
}

pub struct ReadTerminalTool;

#[async_trait]
impl Tool for ReadTerminalTool {
    fn name(&self) -> &str {
        "read_terminal"
    }

    fn description(&self) -> &str {
        "Read the most recent output lines of a terminal session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "terminalId": { "type": "string" },
                "maxLines": { "type": "integer", "minimum": 1 }
            },
            "required": ["terminalId"]
        })
    }

    fn required_capabilities(&self) -> &[&'static str] {
        &[TERMINAL_READ]
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        require_str(&arguments, "terminalId")?;
        let response = call_server(ctx, TERMINAL_READ, arguments).await?;
        Ok(into_tool_result(response))
    }
}

pub struct KillTerminalTool;

#[async_trait]
impl Tool for KillTerminalTool {
    fn name(&self) -> &str {
        "kill_terminal"
    }

    fn description(&self) -> &str {
        "Terminate a terminal session and whatever is running in it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "terminalId": { "type": "string" }
            },
            "required": ["terminalId"]
        })
    }

    fn required_capabilities(&self) -> &[&'static str] {
        &[TERMINAL_KILL]
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let id = require_str(&arguments, "terminalId")?.to_string();
        let response = call_server(ctx, TERMINAL_KILL, json!({ "terminalId": id })).await?;
        if response.success {
            ctx.terminals.remove(&id).await;
            info!(terminal_id = %id, "Terminal closed");
            return Ok(ToolResult::ok(format!("Killed terminal {id}")));
        }
        Ok(into_tool_result(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingServer, context};
    use forgeloop_core::tool::ToolServerResponse;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_send_kill_tracks_registry() {
        let server = Arc::new(RecordingServer::new());
        server.respond(TERMINAL_CREATE, ToolServerResponse::ok(json!({"terminalId": "t-1"})));
        let ctx = context(server.clone(), "/ws");

        let created = CreateTerminalTool
            .execute(json!({"name": "scratch"}), &ctx)
            .await
            .unwrap();
        assert!(created.output.contains("t-1"));
        assert_eq!(ctx.terminals.get("t-1").await.unwrap().name, "scratch");

        SendTerminalTextTool
            .execute(json!({"terminalId": "t-1", "text": "cargo watch"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            ctx.terminals.get("t-1").await.unwrap().command.as_deref(),
            Some("cargo watch")
        );
        assert_eq!(server.requests_for(TERMINAL_SEND_TEXT)[0].parameters["addNewLine"], true);

        KillTerminalTool
            .execute(json!({"terminalId": "t-1"}), &ctx)
            .await
            .unwrap();
        assert!(ctx.terminals.is_empty().await);
    }

    #[tokio::test]
    async fn read_requires_terminal_id() {
        let ctx = context(Arc::new(RecordingServer::new()), "/ws");
        let err = ReadTerminalTool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn read_returns_output() {
        let server = Arc::new(RecordingServer::new());
        server.respond(
            TERMINAL_READ,
            ToolServerResponse::ok(json!({"terminalId": "t-1", "output": "ready in 300ms", "lines": 1})),
        );
        let ctx = context(server, "/ws");

        let result = ReadTerminalTool
            .execute(json!({"terminalId": "t-1"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, "ready in 300ms");
    }

    #[tokio::test]
    async fn failed_kill_keeps_session() {
        let server = Arc::new(RecordingServer::new());
        server.respond(TERMINAL_KILL, ToolServerResponse::failed("Unknown terminal: t-9"));
        let ctx = context(server, "/ws");
        ctx.terminals
            .insert(TerminalSession::new("t-9", "x", "/ws".into()))
            .await;

        let result = KillTerminalTool
            .execute(json!({"terminalId": "t-9"}), &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(ctx.terminals.get("t-9").await.is_some());
    }
}
