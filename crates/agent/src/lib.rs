//! The agent core of ForgeLoop.
//!
//! The agent follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Plan** multi-step objectives into ordered milestones
//! 2. **Prompt** the model with the tool catalogue and plan status
//! 3. **Act** on a `TOOL_CALL:` through the tool orchestrator
//! 4. **Observe** the result, advance milestones, and loop back to step 2
//!
//! The loop continues until the model answers without a tool call, the
//! step budget runs out, or the caller cancels.

pub mod action;
pub mod json;
pub mod milestone;
pub mod planner;
pub mod prompt;
pub mod react;

pub use action::{ParsedAction, TOOL_CALL_MARKER, parse_action};
pub use milestone::{MilestoneUpdate, update_milestone_status};
pub use planner::{
    KeywordClassifier, PlanClassifier, generate_task_plan, parse_task_plan, retain_known_tools,
    should_generate_task_plan,
};
pub use react::{AgentError, LoopOutcome, LoopRequest, ReactController, StopReason};

#[cfg(test)]
pub(crate) mod test_helpers;
