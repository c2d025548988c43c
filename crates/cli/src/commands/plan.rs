//! `forgeloop plan`: print the task plan for an objective.

use forgeloop_agent::{generate_task_plan, should_generate_task_plan};
use forgeloop_config::AppConfig;
use forgeloop_providers::OpenAiCompatProvider;

pub async fn run(objective: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !force && !should_generate_task_plan(objective) {
        println!("This objective looks like a single action; no plan needed (use --force to plan anyway).");
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let provider = OpenAiCompatProvider::from_config(&config.llm);

    match generate_task_plan(
        objective,
        config.agent.system_prompt.as_deref(),
        &config.llm.model,
        &provider,
    )
    .await
    {
        Some(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
        None => {
            return Err("The model did not return a usable plan (run with --verbose for details)".into());
        }
    }
    Ok(())
}
