//! Canonical event protocol for agency completions.
//!
//! `AgencyEvent` is the single source of truth for everything a completion
//! emits. Front-ends consume the events off an unbounded channel and map
//! them to their own presentation format. Events are emitted in the exact
//! order the backend produces them; a delegated exchange splices its whole
//! event sequence in before the parent thread continues.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::backend::Role;

/// Sender half used throughout the core. Send failures mean the consumer
/// abandoned the completion and are ignored.
pub type EventSender = mpsc::UnboundedSender<AgencyEvent>;

/// Events emitted while a completion is driven to its final response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgencyEvent {
    /// A conversation message between two participants.
    Message {
        sender: String,
        receiver: String,
        role: Role,
        content: String,
    },

    /// An agent is invoking one of its tools.
    ToolCall {
        agent: String,
        tool: String,
        arguments: Value,
        call_id: String,
    },

    /// A tool finished and its output is being submitted to the backend.
    ToolOutput {
        agent: String,
        tool: String,
        output: String,
        is_error: bool,
        call_id: String,
    },

    /// A thread hit a terminal backend failure; the completion ends here.
    Error { thread: String, error: String },
}
