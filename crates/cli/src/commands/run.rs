//! `forgeloop run`: drive one objective through the ReAct loop.

use forgeloop_agent::{LoopRequest, ReactController};
use forgeloop_config::AppConfig;
use forgeloop_core::event::ProgressSink;
use forgeloop_core::provider::Provider;
use forgeloop_core::tool::ToolServer;
use forgeloop_providers::OpenAiCompatProvider;
use forgeloop_tools::{HttpToolServer, LocalToolServer, OrchestratorSettings, ToolOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct RunArgs {
    pub objective: String,
    pub workspace: Option<PathBuf>,
    pub max_steps: Option<u32>,
    pub no_plan: bool,
    pub model: Option<String>,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(workspace) = args.workspace {
        config.tools.workspace_root = workspace;
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }

    let workspace = std::path::absolute(&config.tools.workspace_root)?;
    if !workspace.is_dir() {
        return Err(format!("Workspace {} is not a directory", workspace.display()).into());
    }
    config.tools.workspace_root = workspace.clone();

    let server: Arc<dyn ToolServer> = match &config.tools.tool_server_url {
        Some(url) => Arc::new(HttpToolServer::new(url)),
        None => Arc::new(LocalToolServer::new()),
    };
    let orchestrator = Arc::new(ToolOrchestrator::new(
        server,
        OrchestratorSettings::from_config(&config.tools),
    )?);
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config.llm));
    match provider.health_check().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(endpoint = %config.llm.endpoint, "Model endpoint did not answer the health check"),
        Err(e) => tracing::warn!(endpoint = %config.llm.endpoint, error = %e, "Model endpoint health check failed"),
    }

    let controller = ReactController::new(provider, orchestrator)
        .with_approval_gate(Arc::new(config.approval.gate()))
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the loop");
            ctrl_c.cancel();
        }
    });

    let mut request = LoopRequest::new(&args.objective, &config.llm.model)
        .with_working_dir(&workspace)
        .with_max_steps(args.max_steps.unwrap_or(config.agent.max_steps))
        .with_task_planning(config.agent.enable_task_planning && !args.no_plan)
        .with_cancellation(cancel);
    if let Some(prompt) = &config.agent.system_prompt {
        request = request.with_system_prompt(prompt);
    }

    let (sink, mut events) = ProgressSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Could not serialize progress event"),
            }
        }
    });

    let outcome = controller.execute_react_loop(request, Some(sink)).await;
    // The sink was moved into the loop and is dropped by now, so the printer drains and exits.
    let _ = printer.await;
    let outcome = outcome?;

    tracing::info!(
        stop_reason = ?outcome.stop_reason,
        tool_calls = outcome.tool_call_count,
        milestones_completed = outcome.milestones_completed,
        "Run finished"
    );
    println!(
        "{}",
        serde_json::json!({
            "type": "final",
            "stopReason": outcome.stop_reason,
            "answer": outcome.final_answer,
        })
    );
    Ok(())
}
