//! Assistants-style HTTP completion backend.
//!
//! Talks to a conversation/run HTTP API: agents are registered once,
//! conversations hold message history server-side, and runs are polled
//! until they finish or suspend on tool calls. The core imposes no
//! timeout on a run; cancellation belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BackendError;

use super::types::{AgentProfile, OutboundMessage, Role, RunEvent, ToolInvocation, ToolOutput};
use super::CompletionBackend;

/// Delay between run status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(700);

/// Configuration for the HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    pub api_key: String,
}

/// HTTP client for an assistants-style conversation API.
pub struct HttpBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value, BackendError> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }

    fn require_id(body: &Value) -> Result<String, BackendError> {
        body.get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| BackendError::Protocol("response missing 'id'".into()))
    }

    /// Fetch the newest message of a finished run's conversation.
    async fn latest_text(&self, conversation_id: &str) -> Result<String, BackendError> {
        let body = self
            .get(&format!("threads/{conversation_id}/messages?limit=1"))
            .await?;
        let text = body
            .pointer("/data/0/content/0/text/value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(text)
    }
}

#[derive(Deserialize)]
struct RunStatus {
    status: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<RawToolCall>,
}

#[derive(Deserialize)]
struct RawToolCall {
    id: String,
    function: RawFunction,
}

#[derive(Deserialize)]
struct RawFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn register_agent(&self, profile: &AgentProfile) -> Result<String, BackendError> {
        let tools: Vec<Value> = profile
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect();

        let body = self
            .post(
                "assistants",
                json!({
                    "name": profile.name,
                    "description": profile.description,
                    "instructions": profile.instructions,
                    "tools": tools,
                }),
            )
            .await?;

        let id = Self::require_id(&body)?;
        tracing::debug!(agent = %profile.name, id = %id, "registered agent");
        Ok(id)
    }

    async fn create_conversation(&self) -> Result<String, BackendError> {
        let body = self.post("threads", json!({})).await?;
        Self::require_id(&body)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &OutboundMessage,
    ) -> Result<(), BackendError> {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let attachments: Vec<Value> = message
            .attachments
            .iter()
            .map(|file_id| json!({ "file_id": file_id }))
            .collect();

        self.post(
            &format!("threads/{conversation_id}/messages"),
            json!({
                "role": role,
                "content": message.content,
                "attachments": attachments,
            }),
        )
        .await?;
        Ok(())
    }

    async fn start_run(
        &self,
        conversation_id: &str,
        agent_id: &str,
    ) -> Result<String, BackendError> {
        let body = self
            .post(
                &format!("threads/{conversation_id}/runs"),
                json!({ "assistant_id": agent_id }),
            )
            .await?;
        Self::require_id(&body)
    }

    async fn poll_run(
        &self,
        conversation_id: &str,
        run_id: &str,
    ) -> Result<RunEvent, BackendError> {
        loop {
            let body = self
                .get(&format!("threads/{conversation_id}/runs/{run_id}"))
                .await?;
            let run: RunStatus = serde_json::from_value(body)
                .map_err(|e| BackendError::Protocol(format!("malformed run status: {e}")))?;

            match run.status.as_str() {
                "queued" | "in_progress" | "cancelling" => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                "requires_action" => {
                    let calls = run
                        .required_action
                        .ok_or_else(|| {
                            BackendError::Protocol("requires_action without action".into())
                        })?
                        .submit_tool_outputs
                        .tool_calls
                        .into_iter()
                        .map(|call| ToolInvocation {
                            id: call.id,
                            name: call.function.name,
                            // Arguments arrive as a JSON-encoded string.
                            arguments: serde_json::from_str(&call.function.arguments)
                                .unwrap_or(Value::String(call.function.arguments)),
                        })
                        .collect();
                    return Ok(RunEvent::ToolCalls(calls));
                }
                "completed" => {
                    let final_text = self.latest_text(conversation_id).await?;
                    return Ok(RunEvent::Completed { final_text });
                }
                "failed" | "cancelled" | "expired" | "incomplete" => {
                    let message = run
                        .last_error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| format!("run ended with status '{}'", run.status));
                    return Ok(RunEvent::Failed { error: message });
                }
                other => {
                    return Err(BackendError::Protocol(format!(
                        "unknown run status '{other}'"
                    )));
                }
            }
        }
    }

    async fn submit_tool_outputs(
        &self,
        conversation_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<(), BackendError> {
        let tool_outputs: Vec<Value> = outputs
            .iter()
            .map(|o| json!({ "tool_call_id": o.call_id, "output": o.output }))
            .collect();

        self.post(
            &format!("threads/{conversation_id}/runs/{run_id}/submit_tool_outputs"),
            json!({ "tool_outputs": tool_outputs }),
        )
        .await?;
        Ok(())
    }
}
