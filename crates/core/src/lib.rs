//! # ForgeLoop Core
//!
//! Domain types, traits, and error definitions for the ForgeLoop coding
//! agent. Beyond `serde` and tokio's sync primitives it has no runtime
//! dependencies; it defines the domain model the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the language model
//! ([`Provider`]), the backing tool server ([`ToolServer`]), and the
//! approval policy ([`ApprovalGate`]). Implementations live in their
//! respective crates, and tests substitute mocks.

pub mod approval;
pub mod error;
pub mod event;
pub mod message;
pub mod plan;
pub mod provider;
pub mod terminal;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use approval::{
    ActionDescriptor, ActionKind, ApprovalDecision, ApprovalGate, AutoApprove, AutonomyLevel,
    PolicyGate,
};
pub use error::{ProviderError, ToolError, TransitionError};
pub use event::{ProgressEvent, ProgressSink};
pub use message::{ConversationId, Message, Role};
pub use plan::{Milestone, MilestoneStatus, Step, TaskPlan};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use terminal::{TerminalRegistry, TerminalSession};
pub use tool::{
    Tool, ToolCall, ToolContext, ToolRegistry, ToolResult, ToolServer, ToolServerRequest,
    ToolServerResponse,
};
