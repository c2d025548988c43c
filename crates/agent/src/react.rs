//! ReAct loop controller: Thought → Action → Observation until done.
//!
//! One invocation owns its transcript, steps, and plan. The loop:
//!
//! 1. Optionally plans the objective and starts the first milestone.
//! 2. Asks the model for the next action, parses a `TOOL_CALL:` if present.
//! 3. Runs the call past the approval gate, then the orchestrator.
//! 4. Feeds the observation back and updates milestones.
//!
//! It stops on a final answer, an exhausted step budget, cancellation, an
//! approval denial with no milestone left to try, or an unreachable
//! workspace. Only provider failures surface as `Err`.

use forgeloop_core::approval::{ActionDescriptor, ApprovalDecision, ApprovalGate, AutoApprove};
use forgeloop_core::error::{ProviderError, ToolError, TransitionError};
use forgeloop_core::event::{self, ProgressEvent, ProgressSink};
use forgeloop_core::message::{ConversationId, Message, Role};
use forgeloop_core::plan::{MilestoneStatus, Step, TaskPlan};
use forgeloop_core::provider::{Provider, ProviderRequest};
use forgeloop_core::tool::ToolCall;
use forgeloop_tools::{ExecuteOptions, ToolOrchestrator};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{ParsedAction, TOOL_CALL_MARKER, parse_action};
use crate::milestone;
use crate::planner::{KeywordClassifier, PlanClassifier, generate_task_plan, retain_known_tools};
use crate::prompt::build_system_prompt;

/// Errors that abort a loop invocation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Milestone bookkeeping failed: {0}")]
    Transition(#[from] TransitionError),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    StepLimitReached,
    Cancelled,
    ApprovalDenied,
    WorkspaceUnreachable,
}

/// Input for one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopRequest {
    pub objective: String,
    /// Replaces the built-in base prompt when set.
    pub system_prompt: Option<String>,
    pub model: String,
    /// Earlier conversation turns, oldest first.
    pub prior_history: Vec<Message>,
    pub conversation_id: ConversationId,
    pub max_steps: u32,
    pub cancellation: CancellationToken,
    /// Workspace for tool calls; the orchestrator default when `None`.
    pub working_dir: Option<PathBuf>,
    pub agent_id: Option<String>,
    pub enable_task_planning: bool,
}

impl LoopRequest {
    pub fn new(objective: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            system_prompt: None,
            model: model.into(),
            prior_history: Vec::new(),
            conversation_id: ConversationId::new(),
            max_steps: 25,
            cancellation: CancellationToken::new(),
            working_dir: None,
            agent_id: None,
            enable_task_planning: true,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.prior_history = history;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_task_planning(mut self, enabled: bool) -> Self {
        self.enable_task_planning = enabled;
        self
    }
}

/// What the loop produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOutcome {
    pub final_answer: String,
    pub steps: Vec<Step>,
    pub task_plan: Option<TaskPlan>,
    pub milestones_completed: usize,
    /// Tool calls dispatched to the orchestrator.
    pub tool_call_count: usize,
    pub stop_reason: StopReason,
    /// Objective, model replies, and observations, without the system prompt.
    pub transcript: Vec<Message>,
}

/// Drives one objective to completion with a model and an orchestrator.
pub struct ReactController {
    provider: Arc<dyn Provider>,
    orchestrator: Arc<ToolOrchestrator>,
    approval: Arc<dyn ApprovalGate>,
    classifier: Arc<dyn PlanClassifier>,
    temperature: f32,
    max_tokens: Option<u32>,
}

/// Mutable state of one invocation.
struct LoopState {
    transcript: Vec<Message>,
    steps: Vec<Step>,
    plan: Option<TaskPlan>,
    tool_call_count: usize,
    /// Tools that succeeded while the active milestone was running.
    satisfied: HashSet<String>,
}

impl LoopState {
    fn active_milestone_id(&self) -> Option<String> {
        let plan = self.plan.as_ref()?;
        milestone::active_index(plan).map(|i| plan.milestones[i].id.clone())
    }

    fn finish(self, final_answer: String, stop_reason: StopReason) -> LoopOutcome {
        LoopOutcome {
            final_answer,
            milestones_completed: self.plan.as_ref().map_or(0, TaskPlan::completed_count),
            steps: self.steps,
            task_plan: self.plan,
            tool_call_count: self.tool_call_count,
            stop_reason,
            transcript: self.transcript,
        }
    }

    /// Last model reasoning, for answers of loops that did not complete.
    fn partial_answer(&self, headline: &str) -> String {
        let last_thought = self
            .transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| match m.content.find(TOOL_CALL_MARKER) {
                Some(i) => m.content[..i].trim().to_string(),
                None => m.content.trim().to_string(),
            })
            .filter(|t| !t.is_empty());

        match last_thought {
            Some(thought) => format!("{headline}\n\nLast progress: {thought}"),
            None => headline.to_string(),
        }
    }
}

impl ReactController {
    pub fn new(provider: Arc<dyn Provider>, orchestrator: Arc<ToolOrchestrator>) -> Self {
        Self {
            provider,
            orchestrator,
            approval: Arc::new(AutoApprove),
            classifier: Arc::new(KeywordClassifier),
            temperature: 0.2,
            max_tokens: None,
        }
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = gate;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn PlanClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Run the loop for `request`, streaming progress into `progress`.
    pub async fn execute_react_loop(
        &self,
        request: LoopRequest,
        progress: Option<ProgressSink>,
    ) -> Result<LoopOutcome, AgentError> {
        let sink = progress.as_ref();
        let cancel = &request.cancellation;

        info!(
            conversation = %request.conversation_id,
            agent = request.agent_id.as_deref().unwrap_or("default"),
            model = %request.model,
            max_steps = request.max_steps,
            "ReAct loop starting"
        );

        let mut state = LoopState {
            transcript: request.prior_history.clone(),
            steps: Vec::new(),
            plan: None,
            tool_call_count: 0,
            satisfied: HashSet::new(),
        };
        state.transcript.push(Message::user(&request.objective));

        // ── Planning ──
        if request.enable_task_planning && self.classifier.should_plan(&request.objective).await {
            if cancel.is_cancelled() {
                return Ok(state.finish("Cancelled before planning.".into(), StopReason::Cancelled));
            }
            state.plan = generate_task_plan(
                &request.objective,
                request.system_prompt.as_deref(),
                &request.model,
                self.provider.as_ref(),
            )
            .await;

            if let Some(plan) = state.plan.as_mut() {
                retain_known_tools(plan, &self.orchestrator.registry().names());
                event::emit(sink, ProgressEvent::Plan { plan: plan.clone() });
                milestone::start_next(plan, sink)?;
            } else {
                debug!("Continuing without a task plan");
            }
        }

        let catalogue = self.orchestrator.registry().catalogue();

        for step_number in 1..=request.max_steps {
            if cancel.is_cancelled() {
                info!(step = step_number, "ReAct loop cancelled");
                let answer = state.partial_answer("Cancelled before the objective was finished.");
                return Ok(state.finish(answer, StopReason::Cancelled));
            }

            // ── Think ──
            let system = build_system_prompt(
                request.system_prompt.as_deref(),
                &catalogue,
                state.plan.as_ref(),
            );
            let mut messages = Vec::with_capacity(state.transcript.len() + 1);
            messages.push(Message::system(system));
            messages.extend(state.transcript.iter().cloned());

            let mut provider_request = ProviderRequest::new(&request.model, messages);
            provider_request.temperature = self.temperature;
            provider_request.max_tokens = self.max_tokens;

            let response = self.provider.complete(provider_request).await?;
            let text = response.message.content;
            debug!(step = step_number, chars = text.len(), "Model replied");

            let call = match parse_action(&text) {
                ParsedAction::FinalAnswer(answer) => {
                    state.transcript.push(Message::assistant(&text));
                    // The answer closes the active milestone; later ones stay pending.
                    if let Some(plan) = state.plan.as_mut() {
                        if let Some(active) = milestone::active_index(plan) {
                            milestone::update_milestone_status(
                                plan,
                                active,
                                MilestoneStatus::Completed,
                                sink,
                                Some(summarize(&answer)),
                                None,
                            )?;
                        }
                    }
                    info!(
                        steps = state.steps.len(),
                        tool_calls = state.tool_call_count,
                        "ReAct loop completed"
                    );
                    return Ok(state.finish(answer, StopReason::Completed));
                }
                ParsedAction::Malformed { reason, .. } => {
                    warn!(step = step_number, reason = %reason, "Unparseable tool call");
                    state.transcript.push(Message::assistant(&text));
                    state.transcript.push(Message::user(format!(
                        "Error: {reason}. Write {TOOL_CALL_MARKER} followed by a JSON object with \"name\" and \"arguments\"."
                    )));
                    continue;
                }
                ParsedAction::ToolCall { call, .. } => call,
            };
            state.transcript.push(Message::assistant(&text));

            // ── Approve ──
            if cancel.is_cancelled() {
                let answer = state.partial_answer("Cancelled before the objective was finished.");
                return Ok(state.finish(answer, StopReason::Cancelled));
            }
            if let Some(reason) = self.check_approval(&call, &state).await {
                if let Some(answer) = Self::handle_denial(&mut state, call, reason, sink)? {
                    return Ok(state.finish(answer, StopReason::ApprovalDenied));
                }
                continue;
            }

            // ── Act ──
            if cancel.is_cancelled() {
                let answer = state.partial_answer("Cancelled before the objective was finished.");
                return Ok(state.finish(answer, StopReason::Cancelled));
            }
            let milestone_id = state.active_milestone_id();
            let result = self
                .orchestrator
                .execute_tool(&call, request.working_dir.as_deref(), ExecuteOptions::default())
                .await;
            state.tool_call_count += 1;

            // ── Observe ──
            match result {
                Ok(result) if result.success => {
                    event::emit(
                        sink,
                        ProgressEvent::ToolExecution {
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: Some(result.output.clone()),
                            error: None,
                        },
                    );
                    state.transcript.push(Message::observation(&call.name, &result.output));
                    state.steps.push(Step {
                        tool_name: call.name.clone(),
                        arguments: call.arguments,
                        result: Some(result.output.clone()),
                        error: None,
                        milestone_id,
                    });
                    state.satisfied.insert(call.name);
                    Self::complete_if_satisfied(&mut state, sink, &result.output)?;
                }
                Ok(result) => {
                    Self::record_failure(&mut state, call, result.output, milestone_id, sink);
                }
                Err(e) => {
                    let message = e.to_string();
                    Self::record_failure(&mut state, call, message.clone(), milestone_id, sink);

                    if e.aborts_loop() {
                        warn!(error = %e, "Workspace unreachable, aborting loop");
                        if let Some(plan) = state.plan.as_mut() {
                            milestone::abandon(plan, sink, &message)?;
                        }
                        let answer = state.partial_answer(&format!("Stopped: {message}"));
                        return Ok(state.finish(answer, StopReason::WorkspaceUnreachable));
                    }
                    if e.is_fatal() {
                        if let Some(plan) = state.plan.as_mut() {
                            milestone::fail_active(plan, sink, &message)?;
                            state.satisfied.clear();
                        }
                    }
                }
            }
        }

        warn!(max_steps = request.max_steps, "ReAct loop hit step limit");
        let answer = state.partial_answer(&format!(
            "Reached the step limit ({}) before finishing the objective.",
            request.max_steps
        ));
        Ok(state.finish(answer, StopReason::StepLimitReached))
    }

    /// `Some(reason)` when the call needs approval and did not get it.
    async fn check_approval(&self, call: &ToolCall, state: &LoopState) -> Option<String> {
        let action = ActionDescriptor::from_call(&call.name, &call.arguments);
        let milestone_gated = state
            .plan
            .as_ref()
            .and_then(|p| milestone::active_index(p).map(|i| p.milestones[i].requires_approval))
            .unwrap_or(false)
            && action.is_mutating();

        if !(milestone_gated || self.approval.should_require_approval(&action)) {
            return None;
        }
        match self.approval.request_approval(&action).await {
            ApprovalDecision::Approved => None,
            ApprovalDecision::Denied { reason } => Some(reason),
        }
    }

    /// Record a denial and move on. Returns the final answer when no
    /// milestone is left to try.
    fn handle_denial(
        state: &mut LoopState,
        call: ToolCall,
        reason: String,
        sink: Option<&ProgressSink>,
    ) -> Result<Option<String>, AgentError> {
        let error = ToolError::ApprovalDenied {
            tool_name: call.name.clone(),
            reason,
        }
        .to_string();
        warn!(tool = %call.name, error = %error, "Tool call not approved");

        state.transcript.push(Message::observation(&call.name, &error));
        state.steps.push(Step {
            tool_name: call.name,
            arguments: call.arguments,
            result: None,
            error: Some(error.clone()),
            milestone_id: state.active_milestone_id(),
        });

        let moved_on = match state.plan.as_mut() {
            Some(plan) if milestone::active_index(&*plan).is_some() => {
                milestone::fail_active(plan, sink, &error)?;
                milestone::active_index(plan).is_some()
            }
            _ => false,
        };
        state.satisfied.clear();

        if moved_on {
            return Ok(None);
        }
        Ok(Some(state.partial_answer(&format!("Stopped: {error}"))))
    }

    fn record_failure(
        state: &mut LoopState,
        call: ToolCall,
        error: String,
        milestone_id: Option<String>,
        sink: Option<&ProgressSink>,
    ) {
        event::emit(
            sink,
            ProgressEvent::ToolExecution {
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
                result: None,
                error: Some(error.clone()),
            },
        );
        state
            .transcript
            .push(Message::observation(&call.name, format!("Error: {error}")));
        state.steps.push(Step {
            tool_name: call.name,
            arguments: call.arguments,
            result: None,
            error: Some(error),
            milestone_id,
        });
    }

    /// Complete the active milestone once each of its tools has succeeded.
    fn complete_if_satisfied(
        state: &mut LoopState,
        sink: Option<&ProgressSink>,
        output: &str,
    ) -> Result<(), AgentError> {
        let Some(plan) = state.plan.as_mut() else {
            return Ok(());
        };
        let Some(active) = milestone::active_index(plan) else {
            return Ok(());
        };

        let done = plan.milestones[active]
            .tools
            .iter()
            .all(|tool| state.satisfied.contains(tool));
        if done {
            milestone::advance(plan, sink, Some(summarize(output)))?;
            state.satisfied.clear();
        }
        Ok(())
    }
}

/// First lines of a tool output, for milestone results.
fn summarize(output: &str) -> String {
    const MAX_CHARS: usize = 280;
    let trimmed = output.trim();
    match trimmed.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
