//! Synthesized delegation capabilities.
//!
//! For every agent with at least one outgoing thread slot the agency
//! builds one `send_message` tool scoped to that agent's legal
//! recipients; in asynchronous dispatch mode, a companion `get_response`
//! tool as well. Instead of synthesizing a bespoke input type per
//! agent/recipient set, each tool is a descriptor carrying the enumerated
//! recipient names and validating membership at invocation time.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

use super::agent::Agent;
use super::DispatchMode;

const SEND_MESSAGE_DESCRIPTION: &str = "Use this tool for direct, synchronous communication \
with the specialized agents of your agency. You receive a response exclusively from the \
designated recipient agent; to continue the dialogue, invoke the tool again with your \
follow-up message. The recipient agent performs no further work after responding, and the \
user cannot see its replies, so you are responsible for relaying them back. Keep engaging \
with the tool until the task is fully resolved.";

const SEND_MESSAGE_DESCRIPTION_ASYNC: &str = "Use this tool for asynchronous communication \
with the specialized agents of your agency. It initiates a task and returns immediately; \
check for the status and response later with the 'get_response' tool. Relay responses to \
the user, who instructs when to check status. Continue until the task is fully resolved.";

const INSTRUCTIONS_FIELD_DOC: &str = "Please repeat your instructions step-by-step, including \
both completed and the following next steps that you need to perform. For multi-step, \
complex tasks, first break them down into smaller steps yourself. Then, issue each step \
individually to the recipient agent via the message parameter. The recipient agent does not \
have access to these instructions; recipient-specific instructions belong in the message \
parameter.";

const MESSAGE_FIELD_DOC: &str = "Specify the task required for the recipient agent to \
complete. Focus on clarifying what the task entails rather than providing exact \
instructions. Most importantly, mention which working memory partitions have been updated \
for the task at hand.";

const ATTACHMENTS_FIELD_DOC: &str = "A list of file ids to be sent as attachments with this \
message. Only use this if you have ids of already uploaded files.";

/// Send-message capability for one agent, scoped to its declared links.
pub struct SendMessageTool {
    recipients: Vec<String>,
    recipient_docs: String,
    dispatch: DispatchMode,
}

#[derive(Deserialize)]
struct SendMessageParams {
    // The sender's own task breakdown; required but consumed by the
    // sending agent itself, never forwarded.
    #[serde(rename = "instructions")]
    _instructions: String,
    recipient: String,
    message: String,
    #[serde(default)]
    message_attachments: Vec<String>,
}

impl SendMessageTool {
    /// Build the capability for an agent whose legal recipients are the
    /// given agents, in slot declaration order.
    pub fn new(recipient_agents: &[&Agent], dispatch: DispatchMode) -> Self {
        let recipients = recipient_agents
            .iter()
            .map(|agent| agent.name().to_string())
            .collect();

        let mut recipient_docs = String::new();
        for agent in recipient_agents {
            if agent.description().is_empty() {
                continue;
            }
            recipient_docs.push_str(agent.name());
            recipient_docs.push_str(": ");
            recipient_docs.push_str(agent.description());
            recipient_docs.push('\n');
        }

        Self {
            recipients,
            recipient_docs,
            dispatch,
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Membership check against the enumerated recipient set.
    fn validate_recipient(&self, recipient: &str) -> Result<(), String> {
        if self.recipients.iter().any(|name| name == recipient) {
            return Ok(());
        }
        Err(format!(
            "Recipient '{}' is not valid. Valid recipients are: {:?}",
            recipient, self.recipients
        ))
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        match self.dispatch {
            DispatchMode::Synchronous => SEND_MESSAGE_DESCRIPTION,
            DispatchMode::Asynchronous => SEND_MESSAGE_DESCRIPTION_ASYNC,
        }
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instructions": {
                    "type": "string",
                    "description": INSTRUCTIONS_FIELD_DOC
                },
                "recipient": {
                    "type": "string",
                    "enum": self.recipients,
                    "description": self.recipient_docs
                },
                "message": {
                    "type": "string",
                    "description": MESSAGE_FIELD_DOC
                },
                "message_attachments": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": ATTACHMENTS_FIELD_DOC
                }
            },
            "required": ["instructions", "recipient", "message"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SendMessageParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if let Err(message) = self.validate_recipient(&params.recipient) {
            return ToolResult::error(message);
        }

        let Some(thread) = ctx.services.threads.get(&ctx.caller, &params.recipient) else {
            return ToolResult::error(format!(
                "No communication thread exists from '{}' to '{}'.",
                ctx.caller, params.recipient
            ));
        };

        tracing::debug!(
            from = %ctx.caller,
            to = %params.recipient,
            dispatch = ?self.dispatch,
            "delegating message"
        );

        match self.dispatch {
            DispatchMode::Synchronous => {
                // Drive the pair thread to exhaustion; its events pass
                // through the caller's own channel, its terminal text
                // becomes this tool's result.
                match thread
                    .get_completion(
                        &params.message,
                        &params.message_attachments,
                        None,
                        &ctx.services,
                        &ctx.events,
                    )
                    .await
                {
                    Ok(final_text) => ToolResult::success(final_text),
                    Err(error) => ToolResult::error(format!(
                        "'{}' could not complete the exchange: {error}",
                        params.recipient
                    )),
                }
            }
            DispatchMode::Asynchronous => {
                match thread
                    .send_async(
                        params.message,
                        params.message_attachments,
                        ctx.services.clone(),
                    )
                    .await
                {
                    Ok(()) => ToolResult::success(format!(
                        "Message sent to '{}'. Poll for the outcome with the \
                         'get_response' tool.",
                        params.recipient
                    )),
                    Err(message) => ToolResult::error(message),
                }
            }
        }
    }
}

/// Companion polling capability, synthesized in asynchronous mode only.
pub struct GetResponseTool {
    recipients: Vec<String>,
}

#[derive(Deserialize)]
struct GetResponseParams {
    recipient: String,
}

impl GetResponseTool {
    pub fn new(recipient_agents: &[&Agent]) -> Self {
        Self {
            recipients: recipient_agents
                .iter()
                .map(|agent| agent.name().to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl Tool for GetResponseTool {
    fn name(&self) -> &str {
        "get_response"
    }

    fn description(&self) -> &str {
        "Check the status of a task sent to a recipient agent, and collect its \
         response once the task has completed. Always use the 'send_message' tool \
         with the designated agent first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "recipient": {
                    "type": "string",
                    "enum": self.recipients,
                    "description": format!(
                        "Recipient agent to check the status of. Valid recipients are: {:?}",
                        self.recipients
                    )
                }
            },
            "required": ["recipient"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<GetResponseParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if !self.recipients.iter().any(|name| name == &params.recipient) {
            return ToolResult::error(format!(
                "Recipient '{}' is not valid. Valid recipients are: {:?}",
                params.recipient, self.recipients
            ));
        }

        let Some(thread) = ctx.services.threads.get(&ctx.caller, &params.recipient) else {
            return ToolResult::error(format!(
                "No communication thread exists from '{}' to '{}'.",
                ctx.caller, params.recipient
            ));
        };

        match thread.check_status().await {
            super::thread::DeliveryStatus::Idle => ToolResult::success(format!(
                "No message has been sent to '{}' yet. Use 'send_message' first.",
                params.recipient
            )),
            super::thread::DeliveryStatus::Pending => ToolResult::success(format!(
                "'{}' is still processing the request.",
                params.recipient
            )),
            super::thread::DeliveryStatus::Ready(text) => ToolResult::success(text),
            super::thread::DeliveryStatus::Failed(error) => ToolResult::error(format!(
                "'{}' failed to complete the task: {error}",
                params.recipient
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_for(names: &[&str]) -> SendMessageTool {
        let agents: Vec<Agent> = names
            .iter()
            .map(|name| Agent::new(*name).with_description(format!("{name} desc")))
            .collect();
        let refs: Vec<&Agent> = agents.iter().collect();
        SendMessageTool::new(&refs, DispatchMode::Synchronous)
    }

    #[test]
    fn schema_enumerates_only_declared_recipients() {
        let tool = tool_for(&["B", "C"]);
        let schema = tool.parameters_schema();
        let enumeration = schema
            .pointer("/properties/recipient/enum")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(enumeration, &vec![json!("B"), json!("C")]);

        let required = schema.pointer("/required").and_then(Value::as_array).unwrap();
        assert_eq!(
            required,
            &vec![json!("instructions"), json!("recipient"), json!("message")]
        );
    }

    #[test]
    fn recipient_docs_collect_descriptions() {
        let tool = tool_for(&["B", "C"]);
        assert!(tool.recipient_docs.contains("B: B desc"));
        assert!(tool.recipient_docs.contains("C: C desc"));
    }

    #[test]
    fn out_of_set_recipient_is_rejected_naming_the_valid_set() {
        let tool = tool_for(&["B", "C"]);
        let message = tool.validate_recipient("D").unwrap_err();
        assert!(message.contains("'D' is not valid"));
        assert!(message.contains("\"B\""));
        assert!(message.contains("\"C\""));
        assert!(tool.validate_recipient("B").is_ok());
    }

    #[test]
    fn description_switches_with_dispatch_mode() {
        let agents = [Agent::new("B")];
        let refs: Vec<&Agent> = agents.iter().collect();

        let sync_tool = SendMessageTool::new(&refs, DispatchMode::Synchronous);
        assert!(sync_tool.description().contains("synchronous"));

        let async_tool = SendMessageTool::new(&refs, DispatchMode::Asynchronous);
        assert!(async_tool.description().contains("asynchronous"));
        assert!(async_tool.description().contains("get_response"));
    }
}
