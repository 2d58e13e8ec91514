//! Tool contract and execution context.
//!
//! Every capability an agent can invoke - domain tools and the
//! synthesized delegation tools alike - implements the one `Tool`
//! contract: a JSON-schema'd input record in, a textual result out.
//! Validation failures come back as error results the invoking agent is
//! expected to read and recover from conversationally, never as panics.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agency::{AgencyServices, EventSender};

/// Tool execution result.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self {
            output: format!("Error: {msg}"),
            is_error: true,
        }
    }
}

/// Parse tool parameters, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::error(format!("Invalid parameters: {e}")))
}

/// Context for tool execution.
///
/// Carries the agency's shared services explicitly so that every mutation
/// of shared state flows through one visible handle instead of a global.
#[derive(Clone)]
pub struct ToolContext {
    /// Name of the agent whose tool set is executing.
    pub caller: String,
    pub services: Arc<AgencyServices>,
    /// Event channel of the completion this execution belongs to; nested
    /// delegation re-yields through the same sender.
    pub events: EventSender,
}

impl ToolContext {
    pub fn new(caller: impl Into<String>, services: Arc<AgencyServices>, events: EventSender) -> Self {
        Self {
            caller: caller.into(),
            services,
            events,
        }
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for the backend
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}
