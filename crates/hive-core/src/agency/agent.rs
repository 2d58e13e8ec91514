//! Agency participants.
//!
//! An `Agent` is an addressable LLM-backed participant: a unique name, a
//! backend identity assigned at initialization, behavioral instructions,
//! and a tool set that grows while the communication graph is built.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::AgentProfile;
use crate::tools::Tool;

/// Prefix of placeholder ids handed out before backend registration.
const TEMP_ID_PREFIX: &str = "temp_id_";

/// An addressable participant in an agency.
///
/// Agents are shared between chart nodes (the same agent usually appears
/// both top-level and inside cliques), so mutable state lives behind a
/// lock and agents are handled as `Arc<Agent>`.
pub struct Agent {
    name: String,
    description: String,
    state: RwLock<AgentState>,
}

#[derive(Default)]
struct AgentState {
    id: Option<String>,
    instructions: String,
    tools: Vec<Arc<dyn Tool>>,
    files_folders: Vec<PathBuf>,
    shared_applied: bool,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            state: RwLock::new(AgentState::default()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(self, instructions: impl Into<String>) -> Self {
        self.state.write().instructions = instructions.into();
        self
    }

    pub fn with_tool(self, tool: Arc<dyn Tool>) -> Self {
        self.add_tool(tool);
        self
    }

    pub fn with_files_folder(self, folder: impl Into<PathBuf>) -> Self {
        self.state.write().files_folders.push(folder.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn id(&self) -> Option<String> {
        self.state.read().id.clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        self.state.write().id = Some(id.into());
    }

    /// Assign a placeholder id if the agent has none yet. Registration in
    /// the graph is idempotent by id, so every agent needs one up front.
    pub fn assign_temp_id_if_missing(&self) {
        let mut state = self.state.write();
        if state.id.is_none() {
            state.id = Some(format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4()));
        }
    }

    /// Drop a placeholder id so the backend can assign the real one.
    pub fn clear_temp_id(&self) {
        let mut state = self.state.write();
        if state
            .id
            .as_deref()
            .is_some_and(|id| id.starts_with(TEMP_ID_PREFIX))
        {
            state.id = None;
        }
    }

    pub fn instructions(&self) -> String {
        self.state.read().instructions.clone()
    }

    /// Append the agency-wide shared instructions. Applied at most once
    /// per agent regardless of how often initialization touches it.
    pub fn append_shared_instructions(&self, shared: &str) {
        if shared.is_empty() {
            return;
        }
        let mut state = self.state.write();
        if state.shared_applied {
            return;
        }
        state.shared_applied = true;
        if state.instructions.is_empty() {
            state.instructions = shared.to_string();
        } else {
            state.instructions = format!("{shared}\n\n{}", state.instructions);
        }
    }

    /// Add a tool, ignoring duplicates by name.
    pub fn add_tool(&self, tool: Arc<dyn Tool>) {
        let mut state = self.state.write();
        if state.tools.iter().any(|t| t.name() == tool.name()) {
            return;
        }
        state.tools.push(tool);
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.state.read().tools.clone()
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.state
            .read()
            .tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn merge_shared_folders(&self, folders: &[PathBuf]) {
        let mut state = self.state.write();
        for folder in folders {
            if !state.files_folders.contains(folder) {
                state.files_folders.push(folder.clone());
            }
        }
    }

    pub fn files_folders(&self) -> Vec<PathBuf> {
        self.state.read().files_folders.clone()
    }

    /// Build the registration payload for the backend.
    pub fn profile(&self) -> AgentProfile {
        let state = self.state.read();
        AgentProfile {
            name: self.name.clone(),
            description: self.description.clone(),
            instructions: state.instructions.clone(),
            tools: state
                .tools
                .iter()
                .map(|tool| crate::backend::ToolSpec {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    input_schema: tool.parameters_schema(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("id", &self.id())
            .finish()
    }
}
