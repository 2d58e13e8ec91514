//! The agency orchestrator.
//!
//! `Agency` owns the parsed communication graph, the thread table, the
//! shared memory store, and the backend handle, and exposes the single
//! external entry point `get_completion`. Construction follows a fixed
//! sequence; a validation failure at any step aborts it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::backend::CompletionBackend;
use crate::error::{AgencyError, PersistError};
use crate::paths;
use crate::persistence::{SettingsStore, ThreadStore};

use super::chart::{AgencyGraph, ChartNode};
use super::delegation::{GetResponseTool, SendMessageTool};
use super::events::AgencyEvent;
use super::memory::MemoryStore;
use super::thread::{Thread, ThreadTable};
use super::{AgencyServices, DispatchMode};

/// Configuration for an agency.
pub struct AgencyConfig {
    /// Shared instructions for every agent: a file path, or the literal
    /// text when no such file exists.
    pub shared_instructions: String,
    /// Folders of shared files merged into every agent.
    pub shared_files: Vec<PathBuf>,
    pub dispatch: DispatchMode,
    /// Local file the settings collaborator round-trips through.
    pub settings_path: PathBuf,
    /// Directory the workflow tools read and write.
    pub workflows_dir: PathBuf,
    /// The shared store every tool invocation mutates. Constructed
    /// explicitly so ownership and test isolation stay visible.
    pub memory: Arc<MemoryStore>,
    pub settings_store: Option<Arc<dyn SettingsStore>>,
    pub thread_store: Option<Arc<dyn ThreadStore>>,
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            shared_instructions: String::new(),
            shared_files: Vec::new(),
            dispatch: DispatchMode::default(),
            settings_path: paths::settings_path(),
            workflows_dir: paths::workflows_dir(),
            memory: Arc::new(MemoryStore::new()),
            settings_store: None,
            thread_store: None,
        }
    }
}

/// An in-flight completion: the streamed events plus the terminal text.
///
/// Consume `next_event` to observe the exchange live (it yields `None`
/// once the completion is over), then call `finish` for the terminal
/// response. Callers that only want the final text call `finish`
/// directly; dropping the event half mid-stream abandons the stream
/// without aborting backend work.
pub struct Completion {
    events: UnboundedReceiver<AgencyEvent>,
    handle: JoinHandle<Result<String, AgencyError>>,
}

impl Completion {
    pub async fn next_event(&mut self) -> Option<AgencyEvent> {
        self.events.recv().await
    }

    pub async fn finish(self) -> Result<String, AgencyError> {
        drop(self.events);
        self.handle
            .await
            .map_err(|e| AgencyError::TaskAborted(e.to_string()))?
    }
}

/// Orchestrator for one running agency configuration.
pub struct Agency {
    graph: AgencyGraph,
    services: Arc<AgencyServices>,
    root_thread: Arc<Thread>,
}

impl Agency {
    /// Build and initialize an agency.
    ///
    /// Fixed order: resolve shared instructions, parse the chart,
    /// synthesize delegation tools, initialize agents (ids, shared
    /// instructions, folders, backend registration, settings
    /// round-trip), initialize threads (restore or eagerly create
    /// conversations when a thread store is present, then persist the
    /// id table).
    pub async fn new(
        chart: Vec<ChartNode>,
        backend: Arc<dyn CompletionBackend>,
        config: AgencyConfig,
    ) -> Result<Arc<Self>, AgencyError> {
        let shared_instructions = resolve_shared_instructions(&config.shared_instructions)?;

        let graph = AgencyGraph::parse(&chart)?;

        // Delegation tools for every agent with outgoing links.
        for (agent_name, recipient_names) in graph.slots() {
            let agent = graph.agent_by_name(agent_name)?;
            let recipient_agents: Vec<&super::agent::Agent> = recipient_names
                .iter()
                .map(|name| graph.agent_by_name(name).map(|a| a.as_ref()))
                .collect::<Result<_, _>>()?;

            agent.add_tool(Arc::new(SendMessageTool::new(
                &recipient_agents,
                config.dispatch,
            )));
            if config.dispatch == DispatchMode::Asynchronous {
                agent.add_tool(Arc::new(GetResponseTool::new(&recipient_agents)));
            }
        }

        // Agent initialization + settings round-trip.
        if let Some(store) = &config.settings_store {
            let loaded = store.load()?;
            write_settings_file(&config.settings_path, &loaded)?;
        }

        for agent in graph.agents() {
            agent.clear_temp_id();
            agent.append_shared_instructions(&shared_instructions);
            agent.merge_shared_folders(&config.shared_files);

            if agent.id().is_none() {
                let id = backend.register_agent(&agent.profile()).await?;
                tracing::info!(agent = %agent.name(), id = %id, "agent registered");
                agent.set_id(id);
            }
        }

        let roster = roster_settings(&graph);
        write_settings_file(&config.settings_path, &roster)?;
        if let Some(store) = &config.settings_store {
            store.save(&roster)?;
        }

        // Thread initialization.
        let mut table = ThreadTable::default();
        for (agent_name, recipient_names) in graph.slots() {
            for recipient_name in recipient_names {
                let recipient = graph.agent_by_name(recipient_name)?.clone();
                table.insert(Arc::new(Thread::new(
                    agent_name.clone(),
                    recipient,
                    backend.clone(),
                )));
            }
        }

        if let Some(store) = &config.thread_store {
            let restored = store.load()?;
            for thread in table.iter() {
                let saved = restored
                    .get(thread.initiator())
                    .and_then(|per_recipient| per_recipient.get(thread.recipient().name()));
                match saved {
                    Some(id) => thread.restore_conversation(id),
                    None => thread.init_conversation().await?,
                }
            }
            store.save(&table.conversation_ids())?;
        }

        let root_thread = Arc::new(Thread::new("User", graph.root().clone(), backend.clone()));

        let services = Arc::new(AgencyServices {
            backend,
            memory: config.memory,
            threads: Arc::new(table),
            workflows_dir: config.workflows_dir,
            dispatch: config.dispatch,
        });

        Ok(Arc::new(Self {
            graph,
            services,
            root_thread,
        }))
    }

    /// Start a completion on the root thread (User ↔ entry agent, or
    /// User ↔ the named main recipient). Returns the streamed events and
    /// a handle for the terminal response.
    pub fn get_completion(
        &self,
        message: impl Into<String>,
        attachments: Vec<String>,
        recipient: Option<&str>,
    ) -> Result<Completion, AgencyError> {
        let message = message.into();

        let target = match recipient {
            Some(name) => {
                if !self.graph.is_main_recipient(name) {
                    return Err(AgencyError::NotMainRecipient(name.to_string()));
                }
                self.graph.agent_by_name(name)?.clone()
            }
            None => self.graph.root().clone(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let services = self.services.clone();
        let root_thread = self.root_thread.clone();

        let handle = tokio::spawn(async move {
            services.memory.set_user_input_pending(true);
            services
                .memory
                .append_transcript(&format!("👤 User 🗣️ @{}:\n{message}", target.name()));

            let result = root_thread
                .get_completion(&message, &attachments, Some(&target), &services, &tx)
                .await;

            if let Ok(final_text) = &result {
                if !final_text.is_empty() {
                    services.memory.append_transcript(&format!(
                        "🤖 {} 🗣️ User:\n{final_text}",
                        target.name()
                    ));
                }
            }
            services.memory.set_user_input_pending(false);
            result
        });

        Ok(Completion { events: rx, handle })
    }

    /// Run a completion and return only the terminal response.
    pub async fn get_completion_text(
        &self,
        message: impl Into<String>,
        attachments: Vec<String>,
        recipient: Option<&str>,
    ) -> Result<String, AgencyError> {
        self.get_completion(message, attachments, recipient)?
            .finish()
            .await
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.services.memory
    }

    pub fn graph(&self) -> &AgencyGraph {
        &self.graph
    }

    pub fn main_recipient_names(&self) -> Vec<String> {
        self.graph
            .main_recipients()
            .iter()
            .map(|agent| agent.name().to_string())
            .collect()
    }

    pub fn services(&self) -> &Arc<AgencyServices> {
        &self.services
    }
}

/// The text is a path when such a file exists, the literal otherwise.
fn resolve_shared_instructions(source: &str) -> Result<String, AgencyError> {
    if source.is_empty() {
        return Ok(String::new());
    }
    let path = Path::new(source);
    if path.is_file() {
        return std::fs::read_to_string(path).map_err(|source| AgencyError::SharedInstructions {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(source.to_string())
}

/// Registered agent roster, the settings produced by initialization.
fn roster_settings(graph: &AgencyGraph) -> Value {
    Value::Array(
        graph
            .agents()
            .iter()
            .map(|agent| {
                json!({
                    "name": agent.name(),
                    "id": agent.id(),
                    "description": agent.description(),
                    "tools": tools_of(agent),
                })
            })
            .collect(),
    )
}

fn tools_of(agent: &super::agent::Agent) -> Vec<String> {
    agent
        .tools()
        .iter()
        .map(|tool| tool.name().to_string())
        .collect()
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let rendered = serde_json::to_string_pretty(settings).unwrap_or_else(|_| "null".to_string());
    std::fs::write(path, rendered).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::agency::agent::Agent;
    use crate::backend::testing::{agent_id_for, ScriptedBackend};
    use crate::backend::{Role, RunEvent, ToolInvocation};
    use crate::persistence::JsonThreadStore;

    use super::*;

    fn entry_worker_chart() -> (Vec<ChartNode>, Arc<Agent>, Arc<Agent>) {
        let entry = Arc::new(
            Agent::new("Entry")
                .with_description("Primary point of contact")
                .with_instructions("Talk to the user"),
        );
        let worker = Arc::new(
            Agent::new("Worker")
                .with_description("Does the actual work")
                .with_instructions("Do what Entry says"),
        );
        let chart = vec![
            ChartNode::Agent(entry.clone()),
            ChartNode::Clique(vec![entry.clone(), worker.clone()]),
        ];
        (chart, entry, worker)
    }

    fn test_config(dir: &std::path::Path) -> AgencyConfig {
        AgencyConfig {
            settings_path: dir.join("settings.json"),
            workflows_dir: dir.join("workflows"),
            ..AgencyConfig::default()
        }
    }

    #[tokio::test]
    async fn construction_registers_agents_and_synthesizes_send_message() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, entry, worker) = entry_worker_chart();

        let agency = Agency::new(chart, backend, test_config(dir.path()))
            .await
            .unwrap();

        assert_eq!(agency.main_recipient_names(), ["Entry"]);
        assert_eq!(entry.id().unwrap(), agent_id_for("Entry"));
        assert_eq!(worker.id().unwrap(), agent_id_for("Worker"));

        // Exactly one thread slot, Entry -> Worker.
        assert_eq!(agency.services().threads.len(), 1);
        assert!(agency.services().threads.get("Entry", "Worker").is_some());
        assert!(agency.services().threads.get("Worker", "Entry").is_none());

        // Entry got exactly one send_message capability, scoped to Worker.
        let tools = entry.tools();
        let send: Vec<_> = tools.iter().filter(|t| t.name() == "send_message").collect();
        assert_eq!(send.len(), 1);
        let enumeration = send[0]
            .parameters_schema()
            .pointer("/properties/recipient/enum")
            .cloned()
            .unwrap();
        assert_eq!(enumeration, json!(["Worker"]));

        // The worker has no outgoing links, so no send_message.
        assert!(worker.tool("send_message").is_none());

        // The settings file carries the registered roster.
        let settings: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("settings.json")).unwrap())
                .unwrap();
        assert_eq!(settings[0]["name"], "Entry");
        assert_eq!(settings[0]["id"], agent_id_for("Entry"));
    }

    #[tokio::test]
    async fn shared_instructions_are_prepended_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, entry, _) = entry_worker_chart();

        let config = AgencyConfig {
            shared_instructions: "Act as one organization.".into(),
            ..test_config(dir.path())
        };
        Agency::new(chart, backend, config).await.unwrap();

        let instructions = entry.instructions();
        assert!(instructions.starts_with("Act as one organization."));
        assert!(instructions.contains("Talk to the user"));
    }

    #[tokio::test]
    async fn delegation_streams_through_and_returns_terminal_text() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, _, _) = entry_worker_chart();

        backend.script_run(
            "Entry",
            vec![
                RunEvent::ToolCalls(vec![ToolInvocation {
                    id: "call_send".into(),
                    name: "send_message".into(),
                    arguments: json!({
                        "instructions": "1. delegate 2. report",
                        "recipient": "Worker",
                        "message": "summarize the working upload memory",
                    }),
                }]),
                RunEvent::Completed {
                    final_text: "Worker reports: summary ready".into(),
                },
            ],
        );
        backend.script_run(
            "Worker",
            vec![RunEvent::Completed {
                final_text: "summary ready".into(),
            }],
        );

        let agency = Agency::new(chart, backend.clone(), test_config(dir.path()))
            .await
            .unwrap();

        let mut completion = agency
            .get_completion("please summarize", Vec::new(), None)
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = completion.next_event().await {
            events.push(event);
        }
        let final_text = completion.finish().await.unwrap();
        assert_eq!(final_text, "Worker reports: summary ready");

        // Depth-first splice: the nested exchange's events sit between
        // the tool call and its output.
        let kinds: Vec<String> = events
            .iter()
            .map(|event| match event {
                AgencyEvent::Message { sender, receiver, .. } => {
                    format!("msg:{sender}->{receiver}")
                }
                AgencyEvent::ToolCall { tool, .. } => format!("call:{tool}"),
                AgencyEvent::ToolOutput { tool, .. } => format!("out:{tool}"),
                AgencyEvent::Error { .. } => "error".into(),
            })
            .collect();
        assert_eq!(
            kinds,
            [
                "msg:User->Entry",
                "call:send_message",
                "msg:Entry->Worker",
                "msg:Worker->Entry",
                "out:send_message",
                "msg:Entry->User",
            ]
        );

        // The nested terminal text became the tool output.
        assert!(matches!(
            &events[4],
            AgencyEvent::ToolOutput { output, is_error: false, .. } if output == "summary ready"
        ));
    }

    #[tokio::test]
    async fn unknown_recipient_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, _, _) = entry_worker_chart();

        let agency = Agency::new(chart, backend, test_config(dir.path()))
            .await
            .unwrap();

        // Worker is registered but not a main recipient.
        let err = match agency.get_completion("hi", Vec::new(), Some("Worker")) {
            Err(err) => err,
            Ok(_) => panic!("expected a NotMainRecipient error"),
        };
        assert!(matches!(err, AgencyError::NotMainRecipient(name) if name == "Worker"));
    }

    #[tokio::test]
    async fn async_mode_adds_get_response_companion() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, entry, worker) = entry_worker_chart();

        let config = AgencyConfig {
            dispatch: DispatchMode::Asynchronous,
            ..test_config(dir.path())
        };
        Agency::new(chart, backend, config).await.unwrap();

        assert!(entry.tool("get_response").is_some());
        assert!(worker.tool("get_response").is_none());
    }

    #[tokio::test]
    async fn thread_store_round_trips_conversation_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonThreadStore::new(dir.path().join("threads.json")));

        let backend = Arc::new(ScriptedBackend::new());
        let (chart, _, _) = entry_worker_chart();
        let config = AgencyConfig {
            thread_store: Some(store.clone()),
            ..test_config(dir.path())
        };
        let agency = Agency::new(chart, backend, config).await.unwrap();

        // Eagerly established and persisted.
        let thread = agency.services().threads.get("Entry", "Worker").unwrap();
        let conversation_id = thread.conversation_id().unwrap();

        // A fresh agency over the same store restores the id instead of
        // creating a new conversation.
        let backend2 = Arc::new(ScriptedBackend::new());
        let (chart2, _, _) = entry_worker_chart();
        let config2 = AgencyConfig {
            thread_store: Some(store),
            settings_path: dir.path().join("settings2.json"),
            workflows_dir: dir.path().join("workflows"),
            ..AgencyConfig::default()
        };
        let agency2 = Agency::new(chart2, backend2.clone(), config2).await.unwrap();
        let restored = agency2.services().threads.get("Entry", "Worker").unwrap();
        assert_eq!(restored.conversation_id().unwrap(), conversation_id);
        assert!(!backend2
            .log_entries()
            .iter()
            .any(|entry| entry.starts_with("create:")));
    }

    #[tokio::test]
    async fn transcript_accumulates_user_facing_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, _, _) = entry_worker_chart();

        backend.script_run(
            "Entry",
            vec![RunEvent::Completed {
                final_text: "hello there".into(),
            }],
        );

        let agency = Agency::new(chart, backend, test_config(dir.path()))
            .await
            .unwrap();
        agency
            .get_completion_text("hi", Vec::new(), None)
            .await
            .unwrap();

        let transcript = agency.memory().transcript();
        assert!(transcript.contains("👤 User 🗣️ @Entry:\nhi"));
        assert!(transcript.contains("🤖 Entry 🗣️ User:\nhello there"));
    }

    #[tokio::test]
    async fn intermediate_messages_flow_with_user_role_first() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let (chart, _, _) = entry_worker_chart();

        backend.script_run(
            "Entry",
            vec![
                RunEvent::Message {
                    role: Role::Assistant,
                    content: "thinking".into(),
                },
                RunEvent::Completed {
                    final_text: "done".into(),
                },
            ],
        );

        let agency = Agency::new(chart, backend, test_config(dir.path()))
            .await
            .unwrap();
        let mut completion = agency.get_completion("go", Vec::new(), None).unwrap();

        let first = completion.next_event().await.unwrap();
        assert!(matches!(
            first,
            AgencyEvent::Message { role: Role::User, sender, .. } if sender == "User"
        ));
        let second = completion.next_event().await.unwrap();
        assert!(matches!(
            second,
            AgencyEvent::Message { content, .. } if content == "thinking"
        ));
        assert_eq!(completion.finish().await.unwrap(), "done");
    }
}
