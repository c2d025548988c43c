//! Remote tool server reached over HTTP.
//!
//! Requests are POSTed as `{tool, parameters}` JSON to `<base>/execute`, and
//! the reply body is `{success, result, error}`.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{ToolServer, ToolServerRequest, ToolServerResponse};
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpToolServer {
    base_url: String,
    capabilities: Vec<String>,
    client: reqwest::Client,
}

impl HttpToolServer {
    /// A server advertising the standard capability set.
    pub fn new(base_url: impl Into<String>) -> Self {
        // No overall request timeout: command duration is bounded by the orchestrator.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            capabilities: super::standard_capabilities(),
            client,
        }
    }

    /// Override the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/execute", self.base_url)
    }
}

#[async_trait]
impl ToolServer for HttpToolServer {
    fn name(&self) -> &str {
        "http"
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn execute(&self, request: ToolServerRequest) -> Result<ToolServerResponse, ToolError> {
        debug!(tool = %request.tool, url = %self.endpoint(), "Dispatching to tool server");

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), tool = %request.tool, body = %body, "Tool server returned error status");
            return Err(ToolError::ExecutionFailed {
                tool_name: request.tool,
                reason: format!("tool server responded with {status}: {body}"),
            });
        }

        response
            .json::<ToolServerResponse>()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: request.tool,
                reason: format!("invalid tool server reply: {e}"),
            })
    }
}
