//! Milestone state machine.
//!
//! Legal transitions:
//!
//! ```text
//! pending ──> in_progress ──> completed
//!    │             │
//!    └──> failed <─┘
//! ```
//!
//! `pending -> failed` covers milestones skipped because the loop stopped
//! before reaching them. At most one milestone is `in_progress` at a time.
//! Every successful transition recomputes the plan percentage and emits a
//! `milestone_update` event.

use chrono::Utc;
use forgeloop_core::error::TransitionError;
use forgeloop_core::event::{self, ProgressEvent, ProgressSink};
use forgeloop_core::plan::{MilestoneStatus, TaskPlan};
use tracing::debug;

/// What a successful transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneUpdate {
    pub milestone_id: String,
    pub from: MilestoneStatus,
    pub status: MilestoneStatus,
    /// Plan completion after the transition.
    pub percentage: u8,
}

pub fn is_legal_transition(from: MilestoneStatus, to: MilestoneStatus) -> bool {
    use MilestoneStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
    )
}

/// Move milestone `index` to `status`.
///
/// Illegal transitions and out-of-range indices leave the plan untouched.
pub fn update_milestone_status(
    plan: &mut TaskPlan,
    index: usize,
    status: MilestoneStatus,
    progress: Option<&ProgressSink>,
    result: Option<String>,
    error: Option<String>,
) -> Result<MilestoneUpdate, TransitionError> {
    let len = plan.milestones.len();
    let current = plan
        .milestones
        .get(index)
        .ok_or(TransitionError::UnknownMilestone { index, len })?;

    let from = current.status;
    if !is_legal_transition(from, status) {
        return Err(TransitionError::Illegal {
            milestone_id: current.id.clone(),
            from,
            to: status,
        });
    }

    if status == MilestoneStatus::InProgress {
        if let Some(active) = active_index(plan) {
            return Err(TransitionError::AlreadyActive {
                milestone_id: current.id.clone(),
                active_id: plan.milestones[active].id.clone(),
            });
        }
    }

    let milestone = &mut plan.milestones[index];
    let now = Utc::now();
    match status {
        MilestoneStatus::InProgress => milestone.started_at = Some(now),
        MilestoneStatus::Completed => {
            milestone.completed_at = Some(now);
            milestone.result = result;
        }
        MilestoneStatus::Failed => {
            milestone.completed_at = Some(now);
            milestone.error = error;
        }
        MilestoneStatus::Pending => {}
    }
    milestone.status = status;
    let milestone_id = milestone.id.clone();
    let title = milestone.title.clone();

    let percentage = percentage(plan);
    debug!(milestone = %title, %from, to = %status, percentage, "Milestone transition");

    event::emit(
        progress,
        ProgressEvent::MilestoneUpdate {
            milestone_id: milestone_id.clone(),
            status,
            percentage,
        },
    );

    Ok(MilestoneUpdate {
        milestone_id,
        from,
        status,
        percentage,
    })
}

/// Start the first pending milestone, if any.
pub fn start_next(
    plan: &mut TaskPlan,
    progress: Option<&ProgressSink>,
) -> Result<Option<MilestoneUpdate>, TransitionError> {
    match plan.next_pending_index() {
        Some(index) => {
            update_milestone_status(plan, index, MilestoneStatus::InProgress, progress, None, None)
                .map(Some)
        }
        None => Ok(None),
    }
}

/// Complete the active milestone and start the next pending one.
pub fn advance(
    plan: &mut TaskPlan,
    progress: Option<&ProgressSink>,
    result: Option<String>,
) -> Result<Vec<MilestoneUpdate>, TransitionError> {
    let mut updates = Vec::new();
    if let Some(active) = active_index(plan) {
        updates.push(update_milestone_status(
            plan,
            active,
            MilestoneStatus::Completed,
            progress,
            result,
            None,
        )?);
    }
    updates.extend(start_next(plan, progress)?);
    Ok(updates)
}

/// Fail the active milestone and start the next pending one.
pub fn fail_active(
    plan: &mut TaskPlan,
    progress: Option<&ProgressSink>,
    error: impl Into<String>,
) -> Result<Vec<MilestoneUpdate>, TransitionError> {
    let mut updates = Vec::new();
    if let Some(active) = active_index(plan) {
        updates.push(update_milestone_status(
            plan,
            active,
            MilestoneStatus::Failed,
            progress,
            None,
            Some(error.into()),
        )?);
    }
    updates.extend(start_next(plan, progress)?);
    Ok(updates)
}

/// Fail the active milestone and every pending one.
pub fn abandon(
    plan: &mut TaskPlan,
    progress: Option<&ProgressSink>,
    error: impl Into<String>,
) -> Result<Vec<MilestoneUpdate>, TransitionError> {
    let error = error.into();
    let mut updates = Vec::new();
    for index in 0..plan.milestones.len() {
        if !plan.milestones[index].status.is_terminal() {
            updates.push(update_milestone_status(
                plan,
                index,
                MilestoneStatus::Failed,
                progress,
                None,
                Some(error.clone()),
            )?);
        }
    }
    Ok(updates)
}

pub fn active_index(plan: &TaskPlan) -> Option<usize> {
    plan.active_index()
}

pub fn percentage(plan: &TaskPlan) -> u8 {
    plan.percentage()
}
