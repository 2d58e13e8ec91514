//! Tools for Hive agents
//!
//! One contract for every capability: a JSON-schema'd input record in, a
//! textual result out. Domain tools live here; the synthesized
//! delegation tools live with the agency graph that scopes them.

pub mod memory;
pub mod registry;
pub mod workflow;

pub use memory::UpdateWorkingMemoryTool;
pub use registry::{parse_params, Tool, ToolContext, ToolResult};
pub use workflow::{ListWorkflowsTool, RecallWorkflowTool, SaveWorkflowTool};
