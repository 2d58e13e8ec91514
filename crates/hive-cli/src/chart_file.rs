//! Chart file loading.
//!
//! An agency is declared in a TOML file: agent entries with their
//! built-in tools, plus clique links. Top-level agents keep file order
//! (the first one becomes the entry agent).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use hive_core::tools::{
    ListWorkflowsTool, RecallWorkflowTool, SaveWorkflowTool, Tool, UpdateWorkingMemoryTool,
};
use hive_core::{Agent, ChartNode};

#[derive(Debug, Deserialize)]
pub struct ChartFile {
    /// Path to a shared instructions file, or literal instruction text.
    #[serde(default)]
    pub shared_instructions: String,
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    /// Built-in tool names granted to this agent.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Whether the external caller may address this agent directly.
    #[serde(default)]
    pub top_level: bool,
}

#[derive(Debug, Deserialize)]
pub struct LinkEntry {
    /// Agents of one communication clique, in declaration order. The
    /// last one receives messages only.
    pub clique: Vec<String>,
}

/// Resolve a built-in tool by name.
fn builtin_tool(name: &str) -> Option<Arc<dyn Tool>> {
    match name {
        "update_working_memory" => Some(Arc::new(UpdateWorkingMemoryTool)),
        "save_workflow" => Some(Arc::new(SaveWorkflowTool)),
        "list_workflows" => Some(Arc::new(ListWorkflowsTool)),
        "recall_workflow" => Some(Arc::new(RecallWorkflowTool)),
        _ => None,
    }
}

/// Load a chart file into chart nodes plus the shared instructions.
pub fn load(path: &Path) -> Result<(Vec<ChartNode>, String)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read chart file {}", path.display()))?;
    let chart: ChartFile = toml::from_str(&raw)
        .with_context(|| format!("invalid chart file {}", path.display()))?;

    let mut agents: HashMap<String, Arc<Agent>> = HashMap::new();
    let mut nodes = Vec::new();

    for entry in &chart.agents {
        if agents.contains_key(&entry.name) {
            bail!("agent '{}' is declared twice in the chart file", entry.name);
        }

        let mut agent = Agent::new(&entry.name)
            .with_description(&entry.description)
            .with_instructions(&entry.instructions);
        for tool_name in &entry.tools {
            let tool = builtin_tool(tool_name)
                .with_context(|| format!("unknown tool '{tool_name}' for agent '{}'", entry.name))?;
            agent = agent.with_tool(tool);
        }

        let agent = Arc::new(agent);
        agents.insert(entry.name.clone(), agent.clone());
        if entry.top_level {
            nodes.push(ChartNode::Agent(agent));
        }
    }

    for link in &chart.links {
        let clique = link
            .clique
            .iter()
            .map(|name| {
                agents
                    .get(name)
                    .cloned()
                    .with_context(|| format!("link references unknown agent '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        nodes.push(ChartNode::Clique(clique));
    }

    Ok((nodes, chart.shared_instructions.clone()))
}
