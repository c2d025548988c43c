//! `execute_command`: run shell commands in the workspace.
//!
//! Ordinary commands run to completion, bounded by the context's timeout.
//! Package-manager scripts that start dev servers are launched in a named
//! terminal instead and left running.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::terminal::TerminalSession;
use forgeloop_core::tool::{Tool, ToolContext, ToolResult, ToolServerRequest};
use serde_json::{Value, json};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::command::{PackageManifest, ScriptInvocation, is_dev_server, shell_quote, split_cd_prefix};
use crate::require_str;
use crate::server::{
    EXECUTE_COMMAND, READ_FILE, TERMINAL_CREATE, TERMINAL_KILL, TERMINAL_SEND_TEXT, WORKSPACE_ROOT,
};

/// Terminal name prefix for dev servers started by `execute_command`.
pub const DEV_SERVER_TERMINAL_PREFIX: &str = "Agent Dev Server – ";

/// Log file written by the background fallback, relative to the command's directory.
pub const DEV_SERVER_LOG: &str = ".forgeloop-dev-server.log";

const CAPABILITIES: &[&str] = &[EXECUTE_COMMAND, READ_FILE, TERMINAL_CREATE, TERMINAL_SEND_TEXT];

/// Execute shell commands, routing dev servers to persistent terminals.
pub struct ExecuteCommandTool;

/// A package script resolved through `package.json`.
struct ResolvedScript {
    script: String,
    command: String,
}

impl ExecuteCommandTool {
    /// Look `command` up in `<dir>/package.json`. Any failure means "run it as is".
    async fn resolve_script(ctx: &ToolContext, dir: &Path, command: &str) -> Option<ResolvedScript> {
        let invocation = ScriptInvocation::parse(command)?;

        let request = ToolServerRequest::new(
            READ_FILE,
            json!({
                "path": "package.json",
                "cwd": dir.to_string_lossy(),
                WORKSPACE_ROOT: ctx.working_dir.to_string_lossy(),
            }),
        );
        let response = match ctx.server.execute(request).await {
            Ok(response) if response.success => response,
            Ok(_) => return None,
            Err(e) => {
                debug!(error = %e, "Could not read package.json");
                return None;
            }
        };

        let manifest = PackageManifest::parse(response.result.get("content")?.as_str()?)?;
        let body = manifest.script(&invocation.script)?;

        Some(ResolvedScript {
            command: invocation.resolve(body),
            script: invocation.script,
        })
    }

    /// Run `command` to completion, bounded by the context timeout.
    async fn run_to_completion(
        ctx: &ToolContext,
        dir: &Path,
        command: &str,
    ) -> Result<ToolResult, ToolError> {
        let timeout_secs = ctx.command_timeout.as_secs();
        let request = ToolServerRequest::new(
            EXECUTE_COMMAND,
            json!({
                "command": command,
                "cwd": dir.to_string_lossy(),
                WORKSPACE_ROOT: ctx.working_dir.to_string_lossy(),
                "timeoutSecs": timeout_secs,
            }),
        );

        let response = match tokio::time::timeout(ctx.command_timeout, ctx.server.execute(request)).await {
            Ok(response) => response?,
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                return Err(ToolError::Timeout {
                    command: command.to_string(),
                    timeout_secs,
                });
            }
        };

        if !response.success {
            return Ok(ToolResult::failure(
                response
                    .error
                    .unwrap_or_else(|| format!("`{command}` could not be executed")),
            ));
        }

        let stdout = response.result.get("stdout").and_then(Value::as_str).unwrap_or("");
        let stderr = response.result.get("stderr").and_then(Value::as_str).unwrap_or("");
        let exit_code = response
            .result
            .get("exitCode")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let success = exit_code == 0;

        let text = if success {
            if stderr.is_empty() {
                stdout.to_string()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            format!("[exit code: {exit_code}]\n{stdout}\n{stderr}")
        };

        Ok(ToolResult {
            call_id: String::new(),
            success,
            output: text.trim().to_string(),
            data: Some(json!({
                "command": command,
                "stdout": stdout,
                "stderr": stderr,
                "exitCode": exit_code,
            })),
        })
    }

    /// Launch a dev server in a named terminal without waiting for it.
    async fn start_dev_server(
        ctx: &ToolContext,
        dir: &Path,
        script: &ResolvedScript,
    ) -> Result<ToolResult, ToolError> {
        let name = format!("{DEV_SERVER_TERMINAL_PREFIX}{}", script.script);
        let cwd = dir.to_string_lossy();
        let root = ctx.working_dir.to_string_lossy();

        let created = ctx
            .server
            .execute(ToolServerRequest::new(
                TERMINAL_CREATE,
                json!({ "name": name, "cwd": cwd, WORKSPACE_ROOT: root }),
            ))
            .await;
        let created = match created {
            Ok(response) if response.success => response,
            Ok(response) => {
                warn!(error = ?response.error, "Terminal creation refused, starting dev server in background");
                return Self::start_in_background(ctx, dir, script).await;
            }
            Err(ToolError::Transport(reason)) => {
                warn!(reason = %reason, "Terminal unavailable, starting dev server in background");
                return Self::start_in_background(ctx, dir, script).await;
            }
            Err(e) => return Err(e),
        };

        let terminal_id = created
            .result
            .get("terminalId")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "execute_command".into(),
                reason: "tool server did not return a terminal id".into(),
            })?
            .to_string();

        let sent = ctx
            .server
            .execute(ToolServerRequest::new(
                TERMINAL_SEND_TEXT,
                json!({
                    "terminalId": terminal_id,
                    "text": script.command,
                    "addNewLine": true,
                    "cwd": cwd,
                    WORKSPACE_ROOT: root,
                }),
            ))
            .await;
        let reason = match sent {
            Ok(response) if response.success => None,
            Ok(response) => Some(response.error.unwrap_or_default()),
            Err(e) => {
                Self::discard_terminal(ctx, dir, &terminal_id).await;
                return Err(e);
            }
        };
        if let Some(reason) = reason {
            Self::discard_terminal(ctx, dir, &terminal_id).await;
            return Ok(ToolResult::failure(format!(
                "Created terminal {terminal_id} but could not start `{}`: {reason}",
                script.command
            )));
        }

        let mut session = TerminalSession::new(&terminal_id, &name, dir.to_path_buf());
        session.command = Some(script.command.clone());
        ctx.terminals.insert(session).await;

        info!(terminal_id = %terminal_id, command = %script.command, "Dev server started");

        Ok(ToolResult::ok(format!(
            "Started dev server `{}` in terminal {terminal_id} ({name}). It keeps running in the background; use read_terminal with this terminal id to check its output.",
            script.command
        ))
        .with_data(json!({
            "terminalId": terminal_id,
            "name": name,
            "command": script.command,
            "script": script.script,
            "devServer": true,
        })))
    }

    /// Kill a terminal that never got its command, so nothing is left running untracked.
    async fn discard_terminal(ctx: &ToolContext, dir: &Path, terminal_id: &str) {
        let killed = ctx
            .server
            .execute(ToolServerRequest::new(
                TERMINAL_KILL,
                json!({
                    "terminalId": terminal_id,
                    "cwd": dir.to_string_lossy(),
                    WORKSPACE_ROOT: ctx.working_dir.to_string_lossy(),
                }),
            ))
            .await;
        match killed {
            Ok(response) if response.success => {}
            Ok(response) => warn!(terminal_id = %terminal_id, error = ?response.error, "Could not kill terminal"),
            Err(e) => warn!(terminal_id = %terminal_id, error = %e, "Could not kill terminal"),
        }
    }

    /// Fallback when no terminal can be created: detach with `nohup`.
    async fn start_in_background(
        ctx: &ToolContext,
        dir: &Path,
        script: &ResolvedScript,
    ) -> Result<ToolResult, ToolError> {
        let wrapped = format!(
            "nohup sh -c {} > {DEV_SERVER_LOG} 2>&1 & echo $!",
            shell_quote(&script.command)
        );
        let result = Self::run_to_completion(ctx, dir, &wrapped).await?;
        if !result.success {
            return Ok(result);
        }

        let pid = result
            .data
            .as_ref()
            .and_then(|d| d.get("stdout"))
            .and_then(Value::as_str)
            .and_then(|out| out.lines().rev().find_map(|l| l.trim().parse::<u32>().ok()));

        let started = match pid {
            Some(pid) => format!("pid {pid}"),
            None => "unknown pid".to_string(),
        };
        Ok(ToolResult::ok(format!(
            "Started dev server `{}` in the background ({started}); output goes to {DEV_SERVER_LOG}.",
            script.command
        ))
        .with_data(json!({
            "pid": pid,
            "command": script.command,
            "script": script.script,
            "logFile": DEV_SERVER_LOG,
            "devServer": true,
        })))
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return stdout/stderr. Dev servers (npm run dev, yarn start, ...) are started in a persistent terminal and left running."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional directory relative to the workspace"
                }
            },
            "required": ["command"]
        })
    }

    fn required_capabilities(&self) -> &[&'static str] {
        CAPABILITIES
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let command = require_str(&arguments, "command")?.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidArguments("'command' must not be empty".into()));
        }

        let base = match arguments.get("cwd").and_then(Value::as_str) {
            Some(sub) => ctx.working_dir.join(sub),
            None => ctx.working_dir.clone(),
        };
        let (dir, command) = split_cd_prefix(command, &base);

        debug!(command = %command, dir = %dir.display(), "execute_command");

        if let Some(script) = Self::resolve_script(ctx, &dir, &command).await {
            if is_dev_server(&script.script, &script.command) {
                return Self::start_dev_server(ctx, &dir, &script).await;
            }
            debug!(script = %script.script, resolved = %script.command, "Resolved package script");
        }

        Self::run_to_completion(ctx, &dir, &command).await
    }
}
