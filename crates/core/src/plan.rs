//! Task plan, milestone, and step types.
//!
//! A plan is generated once per loop invocation and returned to the caller
//! with the transcript; the core never persists it. These types serialize
//! in camelCase because they are part of the progress-event contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a single milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered unit of work within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    /// 1-based position in the plan.
    pub order: u32,
    pub title: String,
    pub description: String,
    /// Free-form category such as `setup` or `testing`.
    #[serde(rename = "type")]
    pub kind: String,
    pub status: MilestoneStatus,
    pub requires_approval: bool,
    /// Tool names this milestone is expected to use.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Milestone {
    /// A fresh pending milestone. Duplicate tool names are dropped.
    pub fn new(
        order: u32,
        title: impl Into<String>,
        description: impl Into<String>,
        kind: impl Into<String>,
        requires_approval: bool,
        tools: Vec<String>,
    ) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(tools.len());
        for tool in tools {
            if !unique.contains(&tool) {
                unique.push(tool);
            }
        }
        Self {
            id: Uuid::new_v4().to_string(),
            order,
            title: title.into(),
            description: description.into(),
            kind: kind.into(),
            status: MilestoneStatus::Pending,
            requires_approval,
            tools: unique,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// A model-generated decomposition of an objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub id: String,
    pub objective: String,
    pub description: String,
    pub milestones: Vec<Milestone>,
    /// Milestone count at creation time; never updated afterwards.
    pub estimated_steps: usize,
    pub requires_approval: bool,
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    /// Build a plan, numbering milestones `1..=N` in the given order.
    pub fn new(
        objective: impl Into<String>,
        description: impl Into<String>,
        mut milestones: Vec<Milestone>,
    ) -> Self {
        for (i, milestone) in milestones.iter_mut().enumerate() {
            milestone.order = i as u32 + 1;
            milestone.status = MilestoneStatus::Pending;
        }
        let requires_approval = milestones.iter().any(|m| m.requires_approval);
        Self {
            id: Uuid::new_v4().to_string(),
            objective: objective.into(),
            description: description.into(),
            estimated_steps: milestones.len(),
            requires_approval,
            milestones,
            created_at: Utc::now(),
        }
    }

    pub fn completed_count(&self) -> usize {
        self.milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .count()
    }

    /// `round(100 * completed / total)`; an empty plan is at 0.
    pub fn percentage(&self) -> u8 {
        let total = self.milestones.len();
        if total == 0 {
            return 0;
        }
        ((self.completed_count() as f64 * 100.0) / total as f64).round() as u8
    }

    /// Index of the milestone currently in progress.
    pub fn active_index(&self) -> Option<usize> {
        self.milestones
            .iter()
            .position(|m| m.status == MilestoneStatus::InProgress)
    }

    /// Index of the first pending milestone.
    pub fn next_pending_index(&self) -> Option<usize> {
        self.milestones
            .iter()
            .position(|m| m.status == MilestoneStatus::Pending)
    }
}

/// One loop iteration's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milestone active when the step ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
}
