//! Tool execution orchestrator.
//!
//! Owns the tool registry, the backing tool server, and the terminal
//! registry. Every call is bound to a working directory; calls without one
//! run in the configured default workspace.

use forgeloop_core::approval::{ActionDescriptor, ApprovalDecision, ApprovalGate};
use forgeloop_core::error::ToolError;
use forgeloop_core::terminal::{TerminalRegistry, TerminalSession};
use forgeloop_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult, ToolServer, ToolServerRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::server::TERMINAL_KILL;
use crate::shell::DEV_SERVER_TERMINAL_PREFIX;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Used when a call names no working directory.
    pub default_workspace: PathBuf,
    /// Bound for commands that run to completion.
    pub command_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &forgeloop_config::ToolsConfig) -> Self {
        Self {
            default_workspace: config.workspace_root.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&forgeloop_config::ToolsConfig::default())
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Consult the attached approval gate before dispatch.
    pub require_approval: bool,
}

pub struct ToolOrchestrator {
    registry: ToolRegistry,
    server: Arc<dyn ToolServer>,
    terminals: Arc<TerminalRegistry>,
    approval: Option<Arc<dyn ApprovalGate>>,
    settings: OrchestratorSettings,
}

impl ToolOrchestrator {
    /// Build with the default tool set, failing if `server` cannot back it.
    pub fn new(server: Arc<dyn ToolServer>, settings: OrchestratorSettings) -> Result<Self, ToolError> {
        Self::with_registry(server, settings, crate::default_registry())
    }

    pub fn with_registry(
        server: Arc<dyn ToolServer>,
        settings: OrchestratorSettings,
        registry: ToolRegistry,
    ) -> Result<Self, ToolError> {
        registry.validate_against(server.as_ref())?;
        info!(
            server = server.name(),
            tools = registry.names().len(),
            workspace = %settings.default_workspace.display(),
            "Tool orchestrator ready"
        );
        Ok(Self {
            registry,
            server,
            terminals: Arc::new(TerminalRegistry::new()),
            approval: None,
            settings,
        })
    }

    /// Share a terminal registry with other orchestrators.
    pub fn with_terminals(mut self, terminals: Arc<TerminalRegistry>) -> Self {
        self.terminals = terminals;
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = Some(gate);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn terminals(&self) -> &Arc<TerminalRegistry> {
        &self.terminals
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn context(&self, working_dir: Option<&Path>) -> ToolContext {
        ToolContext {
            working_dir: working_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.settings.default_workspace.clone()),
            server: self.server.clone(),
            terminals: self.terminals.clone(),
            command_timeout: self.settings.command_timeout,
        }
    }

    /// Execute one tool call against the workspace.
    pub async fn execute_tool(
        &self,
        call: &ToolCall,
        working_dir: Option<&Path>,
        options: ExecuteOptions,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.registry.require(&call.name)?;

        if options.require_approval {
            if let Some(gate) = &self.approval {
                let action = ActionDescriptor::from_call(&call.name, &call.arguments);
                if gate.should_require_approval(&action) {
                    if let ApprovalDecision::Denied { reason } = gate.request_approval(&action).await {
                        warn!(tool = %call.name, reason = %reason, "Tool call denied");
                        return Err(ToolError::ApprovalDenied {
                            tool_name: call.name.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        let ctx = self.context(working_dir);
        debug!(tool = %call.name, call_id = %call.id, cwd = %ctx.working_dir.display(), "Dispatching tool call");

        let started = Instant::now();
        let outcome = tool.execute(call.arguments.clone(), &ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut result) => {
                result.call_id = call.id.clone();
                debug!(tool = %call.name, success = result.success, elapsed_ms, "Tool call finished");
                Ok(result)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, elapsed_ms, "Tool call failed");
                Err(e)
            }
        }
    }

    /// Dev servers started by `execute_command`, oldest first.
    pub async fn dev_servers(&self) -> Vec<TerminalSession> {
        self.terminals
            .list()
            .await
            .into_iter()
            .filter(|s| s.name.starts_with(DEV_SERVER_TERMINAL_PREFIX))
            .collect()
    }

    /// Kill a tracked dev server terminal and forget it.
    pub async fn stop_dev_server(&self, id: &str) -> Result<TerminalSession, ToolError> {
        let session = self
            .terminals
            .get(id)
            .await
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "kill_terminal".into(),
                reason: format!("no dev server with terminal id {id}"),
            })?;

        let response = self
            .server
            .execute(ToolServerRequest::new(
                TERMINAL_KILL,
                serde_json::json!({
                    "terminalId": id,
                    "cwd": session.working_dir.to_string_lossy(),
                }),
            ))
            .await?;
        if !response.success {
            return Err(ToolError::ExecutionFailed {
                tool_name: "kill_terminal".into(),
                reason: response.error.unwrap_or_else(|| format!("could not kill terminal {id}")),
            });
        }

        self.terminals.remove(id).await;
        info!(terminal_id = %id, name = %session.name, "Dev server stopped");
        Ok(session)
    }
}
