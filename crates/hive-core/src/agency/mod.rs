//! Agency system for Hive
//!
//! ## Orchestrator
//! - `Agency` - graph, thread table, shared memory, `get_completion`
//! - `AgencyConfig` / `AgencyServices` - configuration and dependencies
//! - `AgencyEvent` - event protocol between completions and consumers
//!
//! ## Topology
//! - `ChartNode` / `AgencyGraph` - chart parsing and validation
//! - `Agent` - addressable participant with a growing tool set
//! - `Thread` / `ThreadTable` - one conversation per ordered agent pair
//!
//! ## Delegation
//! - `SendMessageTool` / `GetResponseTool` - synthesized per-agent
//!   capabilities scoped to the agent's declared recipients
//!
//! ## Shared memory
//! - `MemoryStore` - latest/working partitions by provenance source

pub mod agency;
pub mod agent;
pub mod chart;
pub mod delegation;
pub mod events;
pub mod memory;
pub mod thread;

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::CompletionBackend;

pub use agency::{Agency, AgencyConfig, Completion};
pub use agent::Agent;
pub use chart::{AgencyGraph, ChartNode};
pub use delegation::{GetResponseTool, SendMessageTool};
pub use events::{AgencyEvent, EventSender};
pub use memory::{FileEntry, MemorySource, MemoryStore, WorkingSetError};
pub use thread::{DeliveryStatus, Thread, ThreadTable};

/// How a send-message capability dispatches the nested exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Block until the nested exchange completes.
    #[default]
    Synchronous,
    /// Return immediately; the result is polled via `get_response`.
    Asynchronous,
}

/// Shared services threaded through every thread drive and tool
/// invocation.
pub struct AgencyServices {
    pub backend: Arc<dyn CompletionBackend>,
    pub memory: Arc<MemoryStore>,
    pub threads: Arc<ThreadTable>,
    pub workflows_dir: PathBuf,
    pub dispatch: DispatchMode,
}
