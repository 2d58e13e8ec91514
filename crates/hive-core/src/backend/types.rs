//! Wire types for the completion backend collaborator.
//!
//! These are NOT domain types - they describe the request/response surface
//! of the run-and-poll conversation backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Tool definition advertised to the backend when an agent is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Agent registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
}

/// Message appended to a conversation before a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
    /// Opaque attachment handles forwarded to the backend.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl OutboundMessage {
    pub fn user(content: impl Into<String>, attachments: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments,
        }
    }
}

/// A tool invocation the backend is waiting on mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Textual result submitted back for one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

/// Discrete event observed while polling a run.
///
/// `Message` carries intermediate messages only; the terminal assistant
/// text always arrives through `Completed`, so implementations must not
/// emit it twice.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// An intermediate message produced during the run.
    Message { role: Role, content: String },
    /// The run is suspended until tool outputs are submitted.
    ToolCalls(Vec<ToolInvocation>),
    /// The run finished; empty string if no assistant text was produced.
    Completed { final_text: String },
    /// The run failed; the backend will accept no further input for it.
    Failed { error: String },
}
