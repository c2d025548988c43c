//! System prompt assembly for the loop.

use forgeloop_core::plan::{MilestoneStatus, TaskPlan};
use std::fmt::Write;

use crate::action::TOOL_CALL_MARKER;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ForgeLoop, an autonomous coding agent working inside a project workspace. \
You make changes by calling tools, check the results, and keep going until the objective is done.";

/// Base prompt + tool protocol + tool catalogue + plan status.
pub fn build_system_prompt(base: Option<&str>, catalogue: &str, plan: Option<&TaskPlan>) -> String {
    let mut prompt = String::new();
    prompt.push_str(base.unwrap_or(DEFAULT_SYSTEM_PROMPT).trim());

    let _ = write!(
        prompt,
        "\n\n## Tools\n\
         Call at most one tool per reply. Think first, then end your reply with a line of the form\n\
         {TOOL_CALL_MARKER} {{\"name\": \"<tool>\", \"arguments\": {{...}}}}\n\
         and wait for the observation. When the objective is complete, reply with a final summary and no {TOOL_CALL_MARKER} line.\n\n\
         Available tools:\n{catalogue}"
    );

    if let Some(plan) = plan {
        let _ = write!(prompt, "\n\n## Plan\nObjective: {}\n", plan.objective);
        if !plan.description.is_empty() {
            let _ = writeln!(prompt, "{}", plan.description);
        }
        for milestone in &plan.milestones {
            let marker = match milestone.status {
                MilestoneStatus::Pending => " ",
                MilestoneStatus::InProgress => ">",
                MilestoneStatus::Completed => "x",
                MilestoneStatus::Failed => "!",
            };
            let _ = write!(
                prompt,
                "[{marker}] {}. {} ({}): {}",
                milestone.order, milestone.title, milestone.status, milestone.description
            );
            if !milestone.tools.is_empty() {
                let _ = write!(prompt, " [tools: {}]", milestone.tools.join(", "));
            }
            prompt.push('\n');
        }
        if let Some(active) = plan.active_index() {
            let _ = write!(
                prompt,
                "Work on milestone {} now.",
                plan.milestones[active].order
            );
        }
    }

    prompt
}
