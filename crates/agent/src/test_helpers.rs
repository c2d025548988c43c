//! Shared test helpers for agent tests.

use forgeloop_core::error::{ProviderError, ToolError};
use forgeloop_core::message::Message;
use forgeloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use forgeloop_core::tool::{ToolServer, ToolServerRequest, ToolServerResponse};
use forgeloop_tools::{OrchestratorSettings, ToolOrchestrator};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue; the last
/// one repeats once the queue is down to it. Every request is recorded.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Cancel `token` when the `n`th call (1-based) is made.
    pub fn cancel_on_call(self, n: usize, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((n, token));
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let calls = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some((n, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if calls == *n {
                token.cancel();
            }
        }

        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        response.unwrap_or_else(|| panic!("SequentialMockProvider: no responses scripted (call #{calls})"))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Reply text that calls `name` with `arguments`.
pub fn tool_call_text(name: &str, arguments: serde_json::Value) -> String {
    format!(
        "Calling {name}.\nTOOL_CALL: {}",
        serde_json::json!({ "name": name, "arguments": arguments })
    )
}

/// A tool server that records requests and replays scripted replies per tool.
pub struct MockToolServer {
    requests: Mutex<Vec<ToolServerRequest>>,
    replies: Mutex<HashMap<String, Result<ToolServerResponse, ToolError>>>,
}

impl MockToolServer {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
        }
    }

    pub fn respond(&self, tool: &str, response: ToolServerResponse) {
        self.replies.lock().unwrap().insert(tool.into(), Ok(response));
    }

    pub fn fail(&self, tool: &str, error: ToolError) {
        self.replies.lock().unwrap().insert(tool.into(), Err(error));
    }

    pub fn requests(&self) -> Vec<ToolServerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ToolServer for MockToolServer {
    fn name(&self) -> &str {
        "mock"
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
        self.replies
            .lock()
            .unwrap()
            .get(&tool)
            .cloned()
            .unwrap_or_else(|| Ok(ToolServerResponse::ok(serde_json::json!({ "content": "ok" }))))
    }
}

pub fn orchestrator(server: Arc<MockToolServer>) -> Arc<ToolOrchestrator> {
    let settings = OrchestratorSettings {
        default_workspace: PathBuf::from("/ws"),
        command_timeout: Duration::from_secs(300),
    };
    Arc::new(ToolOrchestrator::new(server, settings).unwrap())
}
