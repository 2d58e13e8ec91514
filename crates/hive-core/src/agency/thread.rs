//! Conversation threads - the completion state machine.
//!
//! A `Thread` is the durable conversation between exactly one ordered
//! pair of participants. `get_completion` drives the backend's
//! run-and-poll cycle: append the message, start a run, forward every
//! event in emission order, execute requested tools on the recipient
//! agent (which may recurse into another thread via a delegation tool),
//! and submit the outputs before the backend is allowed to continue.
//!
//! The thread's backend conversation is created lazily on first use, or
//! eagerly when persisted conversation ids are being managed. A thread is
//! never recreated mid-run; a failed exchange leaves it usable for the
//! next one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::backend::{CompletionBackend, OutboundMessage, Role, RunEvent, ToolOutput};
use crate::error::{AgencyError, BackendError};
use crate::tools::{ToolContext, ToolResult};

use super::agent::Agent;
use super::events::{AgencyEvent, EventSender};
use super::AgencyServices;

const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Outcome of polling an asynchronous exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// No asynchronous exchange has been submitted on this thread.
    Idle,
    /// The last submitted exchange is still running.
    Pending,
    /// The last submitted exchange finished with this terminal text.
    Ready(String),
    /// The last submitted exchange failed.
    Failed(String),
}

#[derive(Default)]
struct AsyncExchange {
    handle: Option<JoinHandle<Result<String, AgencyError>>>,
    last: Option<Result<String, String>>,
}

/// One conversation between an ordered pair of participants.
pub struct Thread {
    initiator: String,
    recipient: Arc<Agent>,
    backend: Arc<dyn CompletionBackend>,
    conversation: Mutex<Option<String>>,
    pending: tokio::sync::Mutex<AsyncExchange>,
}

impl Thread {
    pub fn new(
        initiator: impl Into<String>,
        recipient: Arc<Agent>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            initiator: initiator.into(),
            recipient,
            backend,
            conversation: Mutex::new(None),
            pending: tokio::sync::Mutex::new(AsyncExchange::default()),
        }
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    pub fn recipient(&self) -> &Arc<Agent> {
        &self.recipient
    }

    /// Backend conversation id, `None` until first use or restore.
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation.lock().clone()
    }

    /// Adopt a persisted conversation id instead of creating a fresh one.
    pub fn restore_conversation(&self, id: impl Into<String>) {
        *self.conversation.lock() = Some(id.into());
    }

    /// Eagerly establish the backend conversation.
    pub async fn init_conversation(&self) -> Result<(), AgencyError> {
        self.ensure_conversation().await?;
        Ok(())
    }

    async fn ensure_conversation(&self) -> Result<String, BackendError> {
        if let Some(id) = self.conversation.lock().clone() {
            return Ok(id);
        }
        let id = self.backend.create_conversation().await?;
        let mut slot = self.conversation.lock();
        if let Some(existing) = slot.clone() {
            return Ok(existing);
        }
        *slot = Some(id.clone());
        Ok(id)
    }

    /// Drive one exchange to its terminal response.
    ///
    /// Every intermediate event is sent through `events` in the exact
    /// order the backend emits it; the terminal text is the return value,
    /// not an event. A backend failure surfaces as a terminal
    /// `AgencyEvent::Error` plus the `Err` return; no retry is attempted
    /// at this layer.
    pub async fn get_completion(
        &self,
        message: &str,
        attachments: &[String],
        recipient_override: Option<&Arc<Agent>>,
        services: &Arc<AgencyServices>,
        events: &EventSender,
    ) -> Result<String, AgencyError> {
        let recipient = recipient_override.unwrap_or(&self.recipient);
        let label = format!("{} -> {}", self.initiator, recipient.name());

        let agent_id = recipient
            .id()
            .ok_or_else(|| AgencyError::UnregisteredAgent(recipient.name().to_string()))?;

        let conversation_id = self
            .checked(events, &label, self.ensure_conversation())
            .await?;

        self.checked(
            events,
            &label,
            self.backend.append_message(
                &conversation_id,
                &OutboundMessage::user(message, attachments.to_vec()),
            ),
        )
        .await?;

        let _ = events.send(AgencyEvent::Message {
            sender: self.initiator.clone(),
            receiver: recipient.name().to_string(),
            role: Role::User,
            content: message.to_string(),
        });

        let run_id = self
            .checked(events, &label, self.backend.start_run(&conversation_id, &agent_id))
            .await?;
        tracing::debug!(thread = %label, run = %run_id, "run started");

        loop {
            let event = self
                .checked(events, &label, self.backend.poll_run(&conversation_id, &run_id))
                .await?;

            match event {
                RunEvent::Message { role, content } => {
                    let _ = events.send(AgencyEvent::Message {
                        sender: recipient.name().to_string(),
                        receiver: self.initiator.clone(),
                        role,
                        content,
                    });
                }
                RunEvent::ToolCalls(calls) => {
                    let mut outputs = Vec::with_capacity(calls.len());
                    for call in calls {
                        let _ = events.send(AgencyEvent::ToolCall {
                            agent: recipient.name().to_string(),
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                            call_id: call.id.clone(),
                        });

                        let ctx =
                            ToolContext::new(recipient.name(), services.clone(), events.clone());
                        let result = match recipient.tool(&call.name) {
                            Some(tool) => tool.execute(call.arguments, &ctx).await,
                            None => ToolResult::error(format!("Unknown tool: {}", call.name)),
                        };

                        let output = truncate_output(&result.output);
                        let _ = events.send(AgencyEvent::ToolOutput {
                            agent: recipient.name().to_string(),
                            tool: call.name.clone(),
                            output: output.clone(),
                            is_error: result.is_error,
                            call_id: call.id.clone(),
                        });

                        outputs.push(ToolOutput {
                            call_id: call.id,
                            output,
                        });
                    }

                    self.checked(
                        events,
                        &label,
                        self.backend
                            .submit_tool_outputs(&conversation_id, &run_id, &outputs),
                    )
                    .await?;
                }
                RunEvent::Completed { final_text } => {
                    if !final_text.is_empty() {
                        let _ = events.send(AgencyEvent::Message {
                            sender: recipient.name().to_string(),
                            receiver: self.initiator.clone(),
                            role: Role::Assistant,
                            content: final_text.clone(),
                        });
                    }
                    tracing::debug!(thread = %label, run = %run_id, "run completed");
                    return Ok(final_text);
                }
                RunEvent::Failed { error } => {
                    let _ = events.send(AgencyEvent::Error {
                        thread: label.clone(),
                        error: error.clone(),
                    });
                    return Err(BackendError::RunFailed {
                        run_id,
                        message: error,
                    }
                    .into());
                }
            }
        }
    }

    /// Submit an exchange without blocking on it (asynchronous dispatch).
    ///
    /// The exchange runs on the runtime with its events discarded; its
    /// terminal text is retrieved later through `check_status`. Returns a
    /// conversational error if the previous exchange is still running.
    pub async fn send_async(
        self: Arc<Self>,
        message: String,
        attachments: Vec<String>,
        services: Arc<AgencyServices>,
    ) -> Result<(), String> {
        let mut pending = self.pending.lock().await;
        if pending
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return Err(format!(
                "'{}' is still processing the previous message. Check its status with \
                 the 'get_response' tool before sending another one.",
                self.recipient.name()
            ));
        }

        let thread = self.clone();
        pending.last = None;
        pending.handle = Some(tokio::spawn(async move {
            // The background exchange's events are never observed.
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            thread
                .get_completion(&message, &attachments, None, &services, &tx)
                .await
        }));
        Ok(())
    }

    /// Non-blocking status of the latest asynchronous exchange. Creates
    /// no new work.
    pub async fn check_status(&self) -> DeliveryStatus {
        let mut pending = self.pending.lock().await;

        if let Some(handle) = pending.handle.take() {
            if !handle.is_finished() {
                pending.handle = Some(handle);
                return DeliveryStatus::Pending;
            }
            pending.last = Some(match handle.await {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(error)) => Err(error.to_string()),
                Err(join) => Err(format!("completion task aborted: {join}")),
            });
        }

        match &pending.last {
            None => DeliveryStatus::Idle,
            Some(Ok(text)) => DeliveryStatus::Ready(text.clone()),
            Some(Err(error)) => DeliveryStatus::Failed(error.clone()),
        }
    }

    /// Run a backend call, converting a failure into a terminal error
    /// event on this thread before propagating it.
    async fn checked<T>(
        &self,
        events: &EventSender,
        label: &str,
        fut: impl std::future::Future<Output = Result<T, BackendError>>,
    ) -> Result<T, AgencyError> {
        match fut.await {
            Ok(value) => Ok(value),
            Err(error) => {
                let _ = events.send(AgencyEvent::Error {
                    thread: label.to_string(),
                    error: error.to_string(),
                });
                Err(error.into())
            }
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("initiator", &self.initiator)
            .field("recipient", &self.recipient.name())
            .field("conversation", &self.conversation_id())
            .finish()
    }
}

/// Thread table: exactly one thread per ordered (initiator, recipient)
/// pair for the lifetime of the agency.
#[derive(Default)]
pub struct ThreadTable {
    inner: HashMap<String, HashMap<String, Arc<Thread>>>,
}

impl ThreadTable {
    pub fn insert(&mut self, thread: Arc<Thread>) {
        self.inner
            .entry(thread.initiator().to_string())
            .or_default()
            .insert(thread.recipient().name().to_string(), thread);
    }

    pub fn get(&self, initiator: &str, recipient: &str) -> Option<Arc<Thread>> {
        self.inner.get(initiator)?.get(recipient).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.inner.values().flat_map(HashMap::values)
    }

    pub fn len(&self) -> usize {
        self.inner.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of established conversation ids, keyed
    /// initiator -> recipient, for the thread persistence collaborator.
    pub fn conversation_ids(&self) -> HashMap<String, HashMap<String, String>> {
        let mut map: HashMap<String, HashMap<String, String>> = HashMap::new();
        for thread in self.iter() {
            if let Some(id) = thread.conversation_id() {
                map.entry(thread.initiator().to_string())
                    .or_default()
                    .insert(thread.recipient().name().to_string(), id);
            }
        }
        map
    }
}

fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let mut boundary = MAX_TOOL_OUTPUT_CHARS;
    while boundary > 0 && !output.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let clean = &output[..boundary];
    format!(
        "{}\n\n[... OUTPUT TRUNCATED: {} chars -> {} chars ...]",
        clean,
        output.len(),
        clean.len()
    )
}
