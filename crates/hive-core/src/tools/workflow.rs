//! Workflow save/recall tools.
//!
//! A workflow is a saved user-facing interaction: once a multi-step task
//! has been walked through interactively, agents can save it and later
//! replay it as step-by-step guidance with minimal user input. Workflows
//! are plain JSON files under the agency's workflows directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::registry::{parse_params, Tool, ToolContext, ToolResult};

#[derive(Debug, Serialize, Deserialize)]
struct SavedWorkflow {
    name: String,
    #[serde(default)]
    description: String,
    saved_at: DateTime<Utc>,
    steps: Vec<String>,
}

fn workflow_path(dir: &Path, name: &str) -> PathBuf {
    if name.ends_with(".json") {
        dir.join(name)
    } else {
        dir.join(format!("{name}.json"))
    }
}

/// A workflow name must stay a plain file stem.
fn validate_name(name: &str) -> Result<(), ToolResult> {
    let stem = name.strip_suffix(".json").unwrap_or(name);
    if stem.is_empty() || stem.contains(['/', '\\', '.']) {
        return Err(ToolResult::error(
            "Workflow names must be plain names without path separators.",
        ));
    }
    Ok(())
}

// ── save_workflow ──────────────────────────────────────────────────────

pub struct SaveWorkflowTool;

#[derive(Deserialize)]
struct SaveParams {
    workflow_name: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl Tool for SaveWorkflowTool {
    fn name(&self) -> &str {
        "save_workflow"
    }

    fn description(&self) -> &str {
        "Call this tool when the user wants to save the current interaction as a \
         reusable workflow. Ask the user for a workflow name first; a short \
         description helps later selection."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflow_name": {
                    "type": "string",
                    "description": "The name the user wants to give to the workflow."
                },
                "description": {
                    "type": "string",
                    "description": "Two or three lines describing what the workflow does."
                }
            },
            "required": ["workflow_name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SaveParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = validate_name(&params.workflow_name) {
            return e;
        }

        let transcript = ctx.services.memory.transcript();
        if transcript.trim().is_empty() {
            return ToolResult::error(
                "There is no interaction to save yet. Walk through the task with the \
                 user first, then save it as a workflow.",
            );
        }

        let workflow = SavedWorkflow {
            name: params.workflow_name.clone(),
            description: params.description,
            saved_at: Utc::now(),
            steps: transcript
                .split("\n\n")
                .map(str::trim)
                .filter(|block| !block.is_empty())
                .map(ToString::to_string)
                .collect(),
        };

        let dir = &ctx.services.workflows_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            return ToolResult::error(format!("Could not create the workflows directory: {e}"));
        }
        let path = workflow_path(dir, &params.workflow_name);
        let rendered = match serde_json::to_string_pretty(&workflow) {
            Ok(rendered) => rendered,
            Err(e) => return ToolResult::error(format!("Could not serialize the workflow: {e}")),
        };
        if let Err(e) = std::fs::write(&path, rendered) {
            return ToolResult::error(format!("Could not write {}: {e}", path.display()));
        }

        tracing::info!(workflow = %params.workflow_name, "workflow saved");
        ToolResult::success(format!(
            "Workflow '{}' has been saved.",
            params.workflow_name
        ))
    }
}

// ── list_workflows ─────────────────────────────────────────────────────

pub struct ListWorkflowsTool;

#[async_trait]
impl Tool for ListWorkflowsTool {
    fn name(&self) -> &str {
        "list_workflows"
    }

    fn description(&self) -> &str {
        "Call this tool when the user starts an interaction, to display the saved \
         workflows they can choose from."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": false })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let entries = match std::fs::read_dir(&ctx.services.workflows_dir) {
            Ok(entries) => entries,
            Err(_) => {
                return ToolResult::success(
                    "No workflows available. Please interact and save a workflow before \
                     trying to select an existing one.",
                )
            }
        };

        let mut names: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        names.sort();

        if names.is_empty() {
            return ToolResult::success(
                "No workflows available. Please interact and save a workflow before \
                 trying to select an existing one.",
            );
        }

        let mut listing = String::from("The available workflows are:\n");
        for (i, path) in names.iter().enumerate() {
            let description = std::fs::read_to_string(path)
                .ok()
                .and_then(|raw| serde_json::from_str::<SavedWorkflow>(&raw).ok())
                .map(|workflow| workflow.description)
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
            listing.push_str(&format!("{}. {stem}: {description}\n", i + 1));
        }

        ToolResult::success(listing)
    }
}

// ── recall_workflow ────────────────────────────────────────────────────

pub struct RecallWorkflowTool;

#[derive(Deserialize)]
struct RecallParams {
    workflow_name: String,
}

#[async_trait]
impl Tool for RecallWorkflowTool {
    fn name(&self) -> &str {
        "recall_workflow"
    }

    fn description(&self) -> &str {
        "Call this tool when the user wants to execute an existing workflow. It returns \
         the saved interaction as steps to guide the user through, one at a time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflow_name": {
                    "type": "string",
                    "description": "The exact name of the workflow the user requested."
                }
            },
            "required": ["workflow_name"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<RecallParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = validate_name(&params.workflow_name) {
            return e;
        }

        let path = workflow_path(&ctx.services.workflows_dir, &params.workflow_name);
        let workflow = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<SavedWorkflow>(&raw).ok());

        let Some(workflow) = workflow else {
            return ToolResult::error(
                "Invalid workflow name. Please select from the available workflows.",
            );
        };

        let mut steps = String::new();
        for (i, step) in workflow.steps.iter().enumerate() {
            steps.push_str(&format!("Step {}: {step}\n", i + 1));
        }

        ToolResult::success(format!(
            "Here are the steps to guide the user through, one by one, to replicate \
             the workflow:\n\n{steps}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::agency::{AgencyServices, DispatchMode, MemoryStore, ThreadTable};
    use crate::backend::testing::ScriptedBackend;

    use super::*;

    fn ctx_in(dir: &Path) -> ToolContext {
        let memory = Arc::new(MemoryStore::new());
        let services = Arc::new(AgencyServices {
            backend: Arc::new(ScriptedBackend::new()),
            memory,
            threads: Arc::new(ThreadTable::default()),
            workflows_dir: dir.to_path_buf(),
            dispatch: DispatchMode::Synchronous,
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ToolContext::new("Entry", services, tx)
    }

    #[tokio::test]
    async fn save_then_list_then_recall() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        ctx.services
            .memory
            .append_transcript("👤 User 🗣️ @Entry:\nsummarize my files");
        ctx.services
            .memory
            .append_transcript("🤖 Entry 🗣️ User:\nhere is the summary");

        let saved = SaveWorkflowTool
            .execute(
                json!({"workflow_name": "summaries", "description": "Summarize uploads"}),
                &ctx,
            )
            .await;
        assert!(!saved.is_error, "{}", saved.output);
        assert!(saved.output.contains("'summaries' has been saved"));

        let listing = ListWorkflowsTool.execute(json!({}), &ctx).await;
        assert!(listing.output.contains("1. summaries: Summarize uploads"));

        let recalled = RecallWorkflowTool
            .execute(json!({"workflow_name": "summaries"}), &ctx)
            .await;
        assert!(!recalled.is_error);
        assert!(recalled.output.contains("Step 1:"));
        assert!(recalled.output.contains("summarize my files"));
    }

    #[tokio::test]
    async fn saving_an_empty_interaction_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());

        let result = SaveWorkflowTool
            .execute(json!({"workflow_name": "empty"}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("no interaction to save"));
    }

    #[tokio::test]
    async fn listing_without_directory_is_conversational() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(&dir.path().join("missing"));

        let result = ListWorkflowsTool.execute(json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("No workflows available"));
    }

    #[tokio::test]
    async fn recalling_an_unknown_workflow_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());

        let result = RecallWorkflowTool
            .execute(json!({"workflow_name": "nope"}), &ctx)
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("Invalid workflow name"));
    }
}
