//! Completion backend collaborator.
//!
//! The agency core treats the LLM side as an opaque run-and-poll
//! capability: create a conversation, append a message, start a run,
//! observe discrete run events, submit tool outputs. Everything else
//! (transport, model selection, retries) belongs to the implementation.

pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::error::BackendError;
pub use types::{
    AgentProfile, OutboundMessage, Role, RunEvent, ToolInvocation, ToolOutput, ToolSpec,
};

/// Contract every completion backend must satisfy.
///
/// A tool call's output submission happens-before the backend is allowed
/// to proceed to its next step, so `poll_run` after `ToolCalls` must not
/// be called until `submit_tool_outputs` has succeeded.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Register an agent and return its backend identity.
    async fn register_agent(&self, profile: &AgentProfile) -> Result<String, BackendError>;

    /// Create a new empty conversation and return its identity.
    async fn create_conversation(&self) -> Result<String, BackendError>;

    /// Append a message to a conversation.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), BackendError>;

    /// Start a run of the given agent over a conversation.
    async fn start_run(
        &self,
        conversation_id: &str,
        agent_id: &str,
    ) -> Result<String, BackendError>;

    /// Block until the run produces its next discrete event.
    async fn poll_run(
        &self,
        conversation_id: &str,
        run_id: &str,
    ) -> Result<RunEvent, BackendError>;

    /// Submit tool outputs for a run suspended on `RunEvent::ToolCalls`.
    async fn submit_tool_outputs(
        &self,
        conversation_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<(), BackendError>;
}
