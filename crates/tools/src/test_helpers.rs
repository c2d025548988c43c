//! Shared test helpers for tool tests.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::terminal::TerminalRegistry;
use forgeloop_core::tool::{ToolContext, ToolServer, ToolServerRequest, ToolServerResponse};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Scripted {
    Reply(Result<ToolServerResponse, ToolError>),
    Hang,
}

/// A tool server that records every request and replays scripted replies.
///
/// Replies are queued per tool; the last one sticks once the queue drains.
/// Tools with nothing scripted reply `{success: true, result: null}`.
pub struct RecordingServer {
    requests: Mutex<Vec<ToolServerRequest>>,
    scripted: Mutex<HashMap<String, VecDeque<Scripted>>>,
}

impl RecordingServer {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
        }
    }

    fn push(&self, tool: &str, reply: Scripted) {
        self.scripted
            .lock()
            .unwrap()
            .entry(tool.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, tool: &str, response: ToolServerResponse) {
        self.push(tool, Scripted::Reply(Ok(response)));
    }

    pub fn fail(&self, tool: &str, error: ToolError) {
        self.push(tool, Scripted::Reply(Err(error)));
    }

    /// Never reply to `tool`.
    pub fn hang(&self, tool: &str) {
        self.push(tool, Scripted::Hang);
    }

    pub fn requests(&self) -> Vec<ToolServerRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, tool: &str) -> Vec<ToolServerRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.tool == tool)
            .collect()
    }
}

#[async_trait]
impl ToolServer for RecordingServer {
    fn name(&self) -> &str {
        "recording"
    }

    fn capabilities(&self) -> Vec<String> {
        crate::server::standard_capabilities()
    }

    async fn execute(&self, request: ToolServerRequest) -> Result<ToolServerResponse, ToolError> {
        let tool = request.tool.clone();
        self.requests.lock().unwrap().push(request);

        let next = {
            let mut scripted = self.scripted.lock().unwrap();
            match scripted.get_mut(&tool) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match next {
            Some(Scripted::Reply(reply)) => reply,
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(ToolServerResponse::ok(serde_json::Value::Null)),
        }
    }
}

/// A tool context bound to `dir` with a fresh terminal registry and a 300s timeout.
pub fn context(server: Arc<RecordingServer>, dir: &str) -> ToolContext {
    ToolContext {
        working_dir: PathBuf::from(dir),
        server,
        terminals: Arc::new(TerminalRegistry::new()),
        command_timeout: Duration::from_secs(300),
    }
}

/// A `package.json` read reply with the given scripts.
pub fn manifest(scripts: serde_json::Value) -> ToolServerResponse {
    let content = serde_json::json!({ "name": "app", "scripts": scripts }).to_string();
    ToolServerResponse::ok(serde_json::json!({ "path": "package.json", "content": content }))
}

/// An `execute_command` reply.
pub fn command_output(stdout: &str, exit_code: i32) -> ToolServerResponse {
    ToolServerResponse::ok(serde_json::json!({
        "stdout": stdout,
        "stderr": "",
        "exitCode": exit_code,
    }))
}
