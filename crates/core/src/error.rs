//! Error types for the ForgeLoop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

use crate::plan::MilestoneStatus;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool '{tool_name}' needs capability '{capability}' which the tool server does not provide")]
    Unsupported { tool_name: String, capability: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// The message always names the configured duration, e.g. `300s`.
    #[error("Command timeout: `{command}` did not finish within {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Approval denied for {tool_name}: {reason}")]
    ApprovalDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Workspace unreachable: {0}")]
    WorkspaceUnreachable(String),

    /// The tool server could not be reached at all (as opposed to the tool failing).
    #[error("Tool server transport error: {0}")]
    Transport(String),
}

impl ToolError {
    /// Errors the model cannot recover from by picking another action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidArguments(_) | ToolError::WorkspaceUnreachable(_)
        )
    }

    /// Errors that should stop the whole loop, not just the active milestone.
    pub fn aborts_loop(&self) -> bool {
        matches!(self, ToolError::WorkspaceUnreachable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Illegal milestone transition {from} -> {to} for milestone {milestone_id}")]
    Illegal {
        milestone_id: String,
        from: MilestoneStatus,
        to: MilestoneStatus,
    },

    #[error("Cannot start milestone {milestone_id}: milestone {active_id} is still in progress")]
    AlreadyActive {
        milestone_id: String,
        active_id: String,
    },

    #[error("No milestone at index {index} (plan has {len})")]
    UnknownMilestone { index: usize, len: usize },
}
