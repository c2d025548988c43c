//! Task planner.
//!
//! Decides whether an objective is big enough to deserve a plan and, if so,
//! asks the model to break it into milestones. Planning is best-effort: any
//! failure means the loop runs without a plan.

use async_trait::async_trait;
use forgeloop_core::message::Message;
use forgeloop_core::plan::{Milestone, TaskPlan};
use forgeloop_core::provider::{Provider, ProviderRequest};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::json::extract_json_object;

/// Decides whether an objective warrants a task plan.
///
/// The default is [`KeywordClassifier`]; an LLM-backed classifier can be
/// substituted by implementing this trait.
#[async_trait]
pub trait PlanClassifier: Send + Sync {
    async fn should_plan(&self, message: &str) -> bool;
}

/// Verb + noun keyword heuristic over the literal message.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

const MIN_WORDS: usize = 3;

const ACTION_VERBS: &[&str] = &[
    "create", "build", "setup", "initialize", "initialise", "scaffold", "implement", "develop",
    "make", "add", "bootstrap", "generate",
];

const PROJECT_NOUNS: &[&str] = &[
    "app", "apps", "application", "applications", "project", "feature", "features", "website",
    "site", "api", "apis", "server", "service", "services", "component", "components",
    "authentication", "auth", "login", "backend", "frontend", "dashboard", "database", "endpoint",
    "endpoints", "page", "pages", "cli", "library", "game", "module", "integration",
];

/// Openers of questions and single-action requests.
const SINGLE_ACTION_OPENERS: &[&str] = &[
    "what", "who", "why", "when", "where", "which", "how", "explain", "describe", "list", "show",
    "read", "open", "print", "cat", "display", "tell", "is", "are", "does", "do",
];

impl KeywordClassifier {
    pub fn classify(message: &str) -> bool {
        let lowered = message.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.len() < MIN_WORDS {
            return false;
        }
        if SINGLE_ACTION_OPENERS.contains(&words[0]) {
            return false;
        }

        let has_verb = words.iter().any(|w| ACTION_VERBS.contains(w))
            || words.windows(2).any(|pair| pair == ["set", "up"]);
        let has_noun = words.iter().any(|w| PROJECT_NOUNS.contains(w));

        has_verb && has_noun
    }
}

#[async_trait]
impl PlanClassifier for KeywordClassifier {
    async fn should_plan(&self, message: &str) -> bool {
        Self::classify(message)
    }
}

/// Keyword decision for `message`.
pub fn should_generate_task_plan(message: &str) -> bool {
    KeywordClassifier::classify(message)
}

const PLANNING_INSTRUCTIONS: &str = r#"You are planning a software task for an autonomous coding agent.
Break the objective into a short ordered list of milestones (usually 2 to 6).
Reply with a single JSON object and nothing else, in exactly this shape:
{
  "objective": "<the objective>",
  "description": "<one paragraph summary of the approach>",
  "milestones": [
    {
      "title": "<short title>",
      "description": "<what this milestone delivers>",
      "type": "setup | implementation | testing | deployment | other",
      "requiresApproval": false,
      "tools": ["<tool names this milestone needs>"]
    }
  ],
  "estimatedSteps": <number of milestones>
}
Available tools: read_file, write_file, list_directory, delete_file, execute_command, create_terminal, send_terminal_text, read_terminal, kill_terminal.
Set requiresApproval to true only for milestones that delete data or deploy."#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanDraft {
    #[serde(default)]
    description: String,
    #[serde(default)]
    milestones: Vec<MilestoneDraft>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MilestoneDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default, alias = "requires_approval")]
    requires_approval: bool,
    #[serde(default)]
    tools: Vec<String>,
}

fn default_kind() -> String {
    "implementation".into()
}

/// Parse a plan out of raw model text. `None` for anything unusable.
pub fn parse_task_plan(objective: &str, text: &str) -> Option<TaskPlan> {
    let Some(json) = extract_json_object(text) else {
        warn!("Plan response contained no JSON object");
        return None;
    };

    let draft: PlanDraft = match serde_json::from_str(json) {
        Ok(draft) => draft,
        Err(e) => {
            warn!(error = %e, "Plan response did not match the expected shape");
            return None;
        }
    };

    if draft.milestones.is_empty() {
        warn!("Plan response had no milestones");
        return None;
    }

    let milestones = draft
        .milestones
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            Milestone::new(
                i as u32 + 1,
                m.title,
                m.description,
                m.kind,
                m.requires_approval,
                m.tools,
            )
        })
        .collect();

    // The caller's objective wins over whatever the model echoed back.
    Some(TaskPlan::new(objective, draft.description, milestones))
}

/// Drop milestone tools that are not in `known`.
///
/// A milestone whose list ends up empty completes on its next successful call.
pub fn retain_known_tools(plan: &mut TaskPlan, known: &[&str]) {
    for milestone in &mut plan.milestones {
        let before = milestone.tools.len();
        milestone.tools.retain(|tool| known.contains(&tool.as_str()));
        if milestone.tools.len() < before {
            warn!(
                milestone = %milestone.title,
                kept = ?milestone.tools,
                "Dropped unknown tools from milestone"
            );
        }
    }
}

/// Ask the model for a plan. Provider errors and unusable replies yield `None`.
pub async fn generate_task_plan(
    objective: &str,
    system_prompt: Option<&str>,
    model: &str,
    provider: &dyn Provider,
) -> Option<TaskPlan> {
    let instructions = match system_prompt {
        Some(base) => format!("{base}\n\n{PLANNING_INSTRUCTIONS}"),
        None => PLANNING_INSTRUCTIONS.to_string(),
    };
    let mut request = ProviderRequest::new(
        model,
        vec![
            Message::system(instructions),
            Message::user(format!("Objective: {objective}")),
        ],
    );
    request.temperature = 0.2;

    debug!(model = %model, "Requesting task plan");

    let response = match provider.complete(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "Task planning failed");
            return None;
        }
    };

    let plan = parse_task_plan(objective, &response.message.content)?;
    info!(
        plan_id = %plan.id,
        milestones = plan.milestones.len(),
        requires_approval = plan.requires_approval,
        "Task plan generated"
    );
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use forgeloop_core::error::ProviderError;
    use forgeloop_core::plan::MilestoneStatus;

    const THREE_MILESTONES: &str = r#"```json
{
  "objective": "create a react app",
  "description": "Scaffold with Vite, add a page, run the dev server.",
  "milestones": [
    {"title": "Scaffold", "description": "Create the project", "type": "setup", "requiresApproval": false, "tools": ["execute_command"]},
    {"title": "Add page", "description": "Write App.tsx", "type": "implementation", "requiresApproval": false, "tools": ["write_file"]},
    {"title": "Deploy", "description": "Ship it", "type": "deployment", "requiresApproval": true, "tools": ["execute_command"]}
  ],
  "estimatedSteps": 7
}
```"#;

    #[test]
    fn unknown_milestone_tools_are_dropped() {
        let mut plan = parse_task_plan(
            "create a react app",
            r#"{"milestones": [
                {"title": "Install", "tools": ["npm", "shell"]},
                {"title": "Write", "tools": ["write_file", "editor"]}
            ]}"#,
        )
        .unwrap();

        retain_known_tools(&mut plan, &["execute_command", "write_file"]);

        assert!(plan.milestones[0].tools.is_empty());
        assert_eq!(plan.milestones[1].tools, vec!["write_file".to_string()]);
    }

    #[test]
    fn classifier_accepts_build_objectives() {
        assert!(should_generate_task_plan("create a react app"));
        assert!(should_generate_task_plan("build a new application"));
        assert!(should_generate_task_plan("implement authentication feature"));
        assert!(should_generate_task_plan("Set up an Express API server with auth"));
        assert!(should_generate_task_plan("please scaffold a website for my bakery"));
    }

    #[test]
    fn classifier_rejects_questions_and_single_actions() {
        assert!(!should_generate_task_plan("what is react?"));
        assert!(!should_generate_task_plan("list files"));
        assert!(!should_generate_task_plan("read package.json"));
        assert!(!should_generate_task_plan("show me the code"));
        assert!(!should_generate_task_plan("how do I build an app?"));
        assert!(!should_generate_task_plan("fix the typo in README.md"));
        assert!(!should_generate_task_plan("build"));
    }

    #[tokio::test]
    async fn classifier_trait_matches_free_fn() {
        let classifier: &dyn PlanClassifier = &KeywordClassifier;
        assert!(classifier.should_plan("create a todo app").await);
        assert!(!classifier.should_plan("what is rust").await);
    }

    #[tokio::test]
    async fn three_milestone_plan() {
        let provider = SequentialMockProvider::from_texts(&[THREE_MILESTONES]);
        let plan = generate_task_plan("create a react app", None, "mock-model", &provider)
            .await
            .unwrap();

        assert_eq!(plan.estimated_steps, 3);
        let orders: Vec<u32> = plan.milestones.iter().map(|m| m.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(plan.milestones.iter().all(|m| m.status == MilestoneStatus::Pending));
        assert!(plan.requires_approval);
        assert_eq!(plan.milestones[2].kind, "deployment");
        assert_eq!(plan.objective, "create a react app");
    }

    #[tokio::test]
    async fn planning_request_carries_objective_and_system_prompt() {
        let provider = SequentialMockProvider::from_texts(&[THREE_MILESTONES]);
        generate_task_plan("create a react app", Some("You are ForgeLoop."), "m", &provider).await;

        let request = &provider.requests()[0];
        assert!(request.messages[0].content.starts_with("You are ForgeLoop."));
        assert!(request.messages[0].content.contains("\"milestones\""));
        assert!(request.messages[1].content.contains("create a react app"));
    }

    #[test]
    fn unknown_milestone_type_is_preserved() {
        let text = r#"{"milestones": [{"title": "Tune", "type": "performance-tuning"}]}"#;
        let plan = parse_task_plan("speed up the api", text).unwrap();
        assert_eq!(plan.milestones[0].kind, "performance-tuning");
        assert!(plan.milestones[0].tools.is_empty());
    }

    #[test]
    fn malformed_and_empty_plans_are_none() {
        assert!(parse_task_plan("x", "I cannot plan this.").is_none());
        assert!(parse_task_plan("x", r#"{"milestones": "soon"}"#).is_none());
        assert!(parse_task_plan("x", r#"{"description": "nothing", "milestones": []}"#).is_none());
    }

    #[tokio::test]
    async fn provider_error_is_none() {
        let provider = SequentialMockProvider::failing(ProviderError::Network("down".into()));
        assert!(
            generate_task_plan("create a react app", None, "m", &provider)
                .await
                .is_none()
        );
    }
}
