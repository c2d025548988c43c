//! End-to-end integration tests for the ForgeLoop agent.
//!
//! These tests drive the full pipeline from objective to final answer:
//! planning, milestone tracking, tool dispatch through the orchestrator, and
//! the local tool server against a real temporary workspace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forgeloop_agent::{LoopRequest, ReactController, StopReason, should_generate_task_plan};
use forgeloop_core::error::{ProviderError, ToolError};
use forgeloop_core::event::{ProgressEvent, ProgressSink};
use forgeloop_core::message::Message;
use forgeloop_core::plan::MilestoneStatus;
use forgeloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use forgeloop_core::tool::{ToolCall, ToolServer, ToolServerRequest, ToolServerResponse};
use forgeloop_tools::{ExecuteOptions, LocalToolServer, OrchestratorSettings, ToolOrchestrator};
use serde_json::json;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let text = responses[*count].clone();
        *count += 1;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock".into(),
        })
    }
}

fn tool_call(name: &str, arguments: serde_json::Value) -> String {
    format!(
        "Next I will use {name}.\nTOOL_CALL: {}",
        json!({ "name": name, "arguments": arguments })
    )
}

// ── Recording Tool Server ────────────────────────────────────────────────

/// Records every request and answers from a per-tool script.
#[derive(Default)]
struct RecordingServer {
    requests: Mutex<Vec<ToolServerRequest>>,
    replies: Mutex<HashMap<String, ToolServerResponse>>,
}

impl RecordingServer {
    fn with_manifest(scripts: serde_json::Value) -> Self {
        let server = Self::default();
        let content = json!({ "name": "web", "scripts": scripts }).to_string();
        server.respond("read_file", ToolServerResponse::ok(json!({ "content": content })));
        server
    }

    fn respond(&self, tool: &str, response: ToolServerResponse) {
        self.replies.lock().unwrap().insert(tool.into(), response);
    }

    fn tools_called(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.tool.clone())
            .collect()
    }

    fn last(&self, tool: &str) -> serde_json::Value {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.tool == tool)
            .map(|r| r.parameters.clone())
            .unwrap_or_else(|| panic!("{tool} was never called"))
    }
}

#[async_trait::async_trait]
impl ToolServer for RecordingServer {
    fn name(&self) -> &str {
        "recording"
    }

    fn capabilities(&self) -> Vec<String> {
        forgeloop_tools::server::STANDARD_CAPABILITIES
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    async fn execute(&self, request: ToolServerRequest) -> Result<ToolServerResponse, ToolError> {
        let tool = request.tool.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().get(&tool).cloned();
        Ok(reply.unwrap_or_else(|| match tool.as_str() {
            "execute_command" => {
                ToolServerResponse::ok(json!({ "stdout": "done\n", "stderr": "", "exitCode": 0 }))
            }
            "terminal_create" => {
                ToolServerResponse::ok(json!({ "terminalId": "term-1", "name": "Agent Dev Server" }))
            }
            _ => ToolServerResponse::ok(json!({ "content": "ok" })),
        }))
    }
}

fn settings(workspace: &std::path::Path) -> OrchestratorSettings {
    OrchestratorSettings {
        default_workspace: workspace.to_path_buf(),
        command_timeout: Duration::from_secs(300),
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── E2E: Classification ─────────────────────────────────────────────────

#[test]
fn e2e_classifier_decisions() {
    for message in [
        "create a react app",
        "build a new application",
        "implement authentication feature",
    ] {
        assert!(should_generate_task_plan(message), "{message}");
    }
    for message in ["what is react?", "list files", "read package.json"] {
        assert!(!should_generate_task_plan(message), "{message}");
    }
}

// ── E2E: Planned run ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_planned_run_starts_dev_server() {
    let plan = json!({
        "description": "Scaffold, build, then serve",
        "milestones": [
            {"title": "Inspect", "description": "Read the manifest", "type": "setup", "tools": ["read_file"]},
            {"title": "Build", "description": "Production build", "type": "testing", "tools": ["execute_command"]},
            {"title": "Serve", "description": "Start the dev server", "type": "deployment", "tools": ["execute_command"]}
        ]
    })
    .to_string();

    let provider = Arc::new(ScriptedProvider::new(vec![
        plan,
        tool_call("read_file", json!({"path": "package.json"})),
        tool_call("execute_command", json!({"command": "npm run build"})),
        tool_call("execute_command", json!({"command": "npm run dev"})),
        "The app is built and the dev server is running in terminal term-1.".into(),
    ]));
    let server = Arc::new(RecordingServer::with_manifest(
        json!({"dev": "vite", "build": "vite build"}),
    ));
    let orchestrator =
        Arc::new(ToolOrchestrator::new(server.clone(), settings(std::path::Path::new("/web"))).unwrap());
    let (sink, mut rx) = ProgressSink::channel();

    let outcome = ReactController::new(provider.clone(), orchestrator.clone())
        .execute_react_loop(LoopRequest::new("create a react app", "mock"), Some(sink))
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(provider.calls(), 5);
    assert_eq!(outcome.tool_call_count, 3);

    let plan = outcome.task_plan.unwrap();
    assert_eq!(plan.estimated_steps, 3);
    assert_eq!(plan.milestones.iter().map(|m| m.order).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(plan.milestones.iter().all(|m| m.status == MilestoneStatus::Completed));
    assert_eq!(outcome.milestones_completed, 3);

    // Build ran synchronously, dev went to a terminal.
    let execute = server.last("execute_command");
    assert_eq!(execute["command"], "vite build");
    let send = server.last("terminal_send_text");
    assert_eq!(send["terminalId"], "term-1");
    assert_eq!(send["text"], "vite");
    let dev_output = outcome.steps[2].result.as_deref().unwrap();
    assert!(dev_output.contains("vite"));
    assert!(dev_output.contains("term-1"));
    assert_eq!(orchestrator.dev_servers().await.len(), 1);

    let tools = server.tools_called();
    assert_eq!(tools.iter().filter(|t| *t == "terminal_create").count(), 1);

    let events = drain(&mut rx);
    assert_eq!(events[0].event_type(), "plan");
    let tool_events = events.iter().filter(|e| e.event_type() == "tool_execution").count();
    assert_eq!(tool_events, 3);
    match events.last().unwrap() {
        ProgressEvent::MilestoneUpdate { status, percentage, .. } => {
            assert_eq!(*status, MilestoneStatus::Completed);
            assert_eq!(*percentage, 100);
        }
        other => panic!("unexpected last event {other:?}"),
    }
}

#[tokio::test]
async fn e2e_malformed_plan_falls_back_to_unplanned_loop() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        "I'd start with Vite, then add routing.".into(),
        tool_call("execute_command", json!({"command": "cd src && ls"})),
        "src contains main.tsx.".into(),
    ]));
    let server = Arc::new(RecordingServer::default());
    let orchestrator =
        Arc::new(ToolOrchestrator::new(server.clone(), settings(std::path::Path::new("/web"))).unwrap());

    let outcome = ReactController::new(provider, orchestrator)
        .execute_react_loop(LoopRequest::new("build a new application", "mock"), None)
        .await
        .unwrap();

    assert!(outcome.task_plan.is_none());
    assert_eq!(outcome.final_answer, "src contains main.tsx.");

    let execute = server.last("execute_command");
    assert_eq!(execute["command"], "ls");
    assert!(execute["cwd"].as_str().unwrap().ends_with("/src"));
}

// ── E2E: Orchestrator against a real workspace ──────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn e2e_local_server_write_then_run() {
    let workspace = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(
        ToolOrchestrator::new(Arc::new(LocalToolServer::new()), settings(workspace.path())).unwrap(),
    );
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("write_file", json!({"path": "notes/hello.txt", "content": "hello forge\n"})),
        tool_call("execute_command", json!({"command": "cd notes && cat hello.txt"})),
        "The file says hello forge.".into(),
    ]));

    let outcome = ReactController::new(provider, orchestrator)
        .execute_react_loop(LoopRequest::new("write a note", "mock"), None)
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert!(outcome.steps.iter().all(|s| s.error.is_none()));
    assert!(outcome.steps[1].result.as_deref().unwrap().contains("hello forge"));
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("notes/hello.txt")).unwrap(),
        "hello forge\n"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn e2e_mistyped_cd_is_recoverable() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir(workspace.path().join("src")).unwrap();
    std::fs::write(workspace.path().join("src/main.rs"), "fn main() {}\n").unwrap();

    let orchestrator = Arc::new(
        ToolOrchestrator::new(Arc::new(LocalToolServer::new()), settings(workspace.path())).unwrap(),
    );
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_call("execute_command", json!({"command": "cd srcc && ls"})),
        tool_call("execute_command", json!({"command": "cd src && ls"})),
        "src holds main.rs.".into(),
    ]));

    let outcome = ReactController::new(provider, orchestrator)
        .execute_react_loop(LoopRequest::new("list the sources", "mock"), None)
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.steps.len(), 2);
    assert!(outcome.steps[0].error.as_deref().unwrap().contains("No such directory"));
    assert!(outcome.steps[1].result.as_deref().unwrap().contains("main.rs"));
}

#[cfg(unix)]
#[tokio::test]
async fn e2e_local_dev_server_lifecycle() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(
        workspace.path().join("package.json"),
        r#"{"name": "web", "scripts": {"dev": "sleep 30"}}"#,
    )
    .unwrap();

    let orchestrator =
        ToolOrchestrator::new(Arc::new(LocalToolServer::new()), settings(workspace.path())).unwrap();
    let result = orchestrator
        .execute_tool(
            &ToolCall::new("execute_command", json!({"command": "npm run dev"})),
            None,
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.output.contains("sleep 30"));
    let servers = orchestrator.dev_servers().await;
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].command.as_deref(), Some("sleep 30"));

    let stopped = orchestrator.stop_dev_server(&servers[0].id).await.unwrap();
    assert_eq!(stopped.id, servers[0].id);
    assert!(orchestrator.dev_servers().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn e2e_command_timeout_names_duration() {
    struct HangingServer;

    #[async_trait::async_trait]
    impl ToolServer for HangingServer {
        fn name(&self) -> &str {
            "hanging"
        }

        fn capabilities(&self) -> Vec<String> {
            forgeloop_tools::server::STANDARD_CAPABILITIES
                .iter()
                .map(|c| c.to_string())
                .collect()
        }

        async fn execute(&self, request: ToolServerRequest) -> Result<ToolServerResponse, ToolError> {
            if request.tool == "execute_command" {
                std::future::pending::<()>().await;
            }
            Ok(ToolServerResponse::failed("not found"))
        }
    }

    let orchestrator =
        ToolOrchestrator::new(Arc::new(HangingServer), settings(std::path::Path::new("/web"))).unwrap();
    let err = orchestrator
        .execute_tool(
            &ToolCall::new("execute_command", json!({"command": "cargo build"})),
            None,
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();

    let text = err.to_string();
    assert!(text.to_lowercase().contains("timeout"));
    assert!(text.contains("300s"));
}
