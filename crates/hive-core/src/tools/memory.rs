//! Working memory update tool.
//!
//! Agents must refresh the relevant working partition before invoking
//! any agent whose tools consume it; a stale or empty working partition
//! is the most common cross-agent failure mode, so the description
//! spells the contract out.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agency::MemorySource;

use super::registry::{parse_params, Tool, ToolContext, ToolResult};

const DESCRIPTION: &str = "ALWAYS call this tool to update the working memory before \
invoking any agent whose tools take a memory_type argument, because otherwise that agent \
receives empty or outdated working memory. It rebuilds the working partition of the chosen \
source from its latest partition, by either including or excluding a few files.\n\n\
To include files, provide their 1-based file numbers in files_to_include, e.g. [\"1\", \"2\"]. \
To exclude files, provide the numbers in files_to_exclude. Choose whichever list is shorter: \
with 50 files, keeping 5 means files_to_include, dropping 5 means files_to_exclude.\n\n\
To process all files, provide an empty list for files_to_exclude.\n\n\
Provide exactly one of the two arguments; providing both or neither is an error. Call the \
tool multiple times to update different memory types.";

pub struct UpdateWorkingMemoryTool;

#[derive(Deserialize)]
struct Params {
    memory_type: String,
    #[serde(default)]
    files_to_include: Option<Vec<String>>,
    #[serde(default)]
    files_to_exclude: Option<Vec<String>>,
}

#[async_trait]
impl Tool for UpdateWorkingMemoryTool {
    fn name(&self) -> &str {
        "update_working_memory"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memory_type": {
                    "type": "string",
                    "enum": [
                        MemorySource::Upload.latest_key(),
                        MemorySource::Sourced.latest_key(),
                        MemorySource::Chat.latest_key(),
                    ],
                    "description": "The memory to project from. Use 'latest_upload_memory' \
                        for files uploaded by the user, 'latest_sourced_memory' for files \
                        curated by a sourcing agent, 'latest_chat_memory' for files saved \
                        in the chat history."
                },
                "files_to_include": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "1-based file numbers to include, e.g. [\"1\", \"3\"]"
                },
                "files_to_exclude": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "1-based file numbers to exclude; an empty list takes \
                        every file"
                }
            },
            "required": ["memory_type"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let Some(source) = MemorySource::from_latest_key(&params.memory_type) else {
            return ToolResult::error(format!(
                "Invalid memory type '{}'. It can be either 'latest_upload_memory' or \
                 'latest_sourced_memory' or 'latest_chat_memory'.",
                params.memory_type
            ));
        };

        let result = ctx.services.memory.update_working(
            source,
            params.files_to_include.as_deref(),
            params.files_to_exclude.as_deref(),
        );

        match result {
            Ok(count) => ToolResult::success(format!(
                "`{}` has been updated with the required files ({count} file(s)).",
                source.working_key()
            )),
            Err(error) => ToolResult::error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::agency::{
        AgencyServices, DispatchMode, FileEntry, MemoryStore, ThreadTable,
    };
    use crate::backend::testing::ScriptedBackend;

    use super::*;

    fn ctx_with_store() -> (ToolContext, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new());
        let services = Arc::new(AgencyServices {
            backend: Arc::new(ScriptedBackend::new()),
            memory: memory.clone(),
            threads: Arc::new(ThreadTable::default()),
            workflows_dir: std::env::temp_dir(),
            dispatch: DispatchMode::Synchronous,
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        (ToolContext::new("Entry", services, tx), memory)
    }

    #[tokio::test]
    async fn include_projects_working_partition() {
        let (ctx, memory) = ctx_with_store();
        memory.set_latest(
            MemorySource::Sourced,
            vec![
                FileEntry::new("one.pdf", "/tmp/one.pdf"),
                FileEntry::new("two.pdf", "/tmp/two.pdf"),
            ],
        );

        let result = UpdateWorkingMemoryTool
            .execute(
                json!({
                    "memory_type": "latest_sourced_memory",
                    "files_to_include": ["2"],
                }),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        assert!(result.output.contains("`working_sourced_memory`"));
        let working = memory.working(MemorySource::Sourced);
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].name, "two.pdf");
    }

    #[tokio::test]
    async fn both_selectors_become_a_conversational_error() {
        let (ctx, _memory) = ctx_with_store();
        let result = UpdateWorkingMemoryTool
            .execute(
                json!({
                    "memory_type": "latest_upload_memory",
                    "files_to_include": ["1"],
                    "files_to_exclude": ["2"],
                }),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("only one of"));
    }

    #[tokio::test]
    async fn unknown_memory_type_names_the_valid_ones() {
        let (ctx, _memory) = ctx_with_store();
        let result = UpdateWorkingMemoryTool
            .execute(
                json!({
                    "memory_type": "latest_dream_memory",
                    "files_to_exclude": [],
                }),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("latest_upload_memory"));
        assert!(result.output.contains("latest_chat_memory"));
    }
}
