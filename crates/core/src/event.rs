//! Progress events streamed while a loop runs.
//!
//! The loop writes events into a [`ProgressSink`]; whoever holds the
//! receiving end decides where they go (socket, log, test spy). Events are
//! emitted, never stored.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::plan::{MilestoneStatus, TaskPlan};

/// One progress emission, serialized as a single JSON object with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    /// A plan was generated.
    Plan { plan: TaskPlan },

    /// A milestone changed status.
    MilestoneUpdate {
        milestone_id: String,
        status: MilestoneStatus,
        percentage: u8,
    },

    /// A tool call finished.
    ToolExecution {
        tool: String,
        arguments: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ProgressEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Plan { .. } => "plan",
            Self::MilestoneUpdate { .. } => "milestone_update",
            Self::ToolExecution { .. } => "tool_execution",
        }
    }
}

/// Sending half of a progress stream.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// A sink plus the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn emit(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.sender.send(event);
    }
}

/// Emit through an optional sink; absent sink is a no-op.
pub fn emit(sink: Option<&ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = sink {
        sink.emit(event);
    }
}
