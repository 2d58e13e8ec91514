//! # hive-core
//!
//! Core library for Hive - a multi-agent agency orchestrator.
//!
//! An *agency* is a set of LLM-backed agents arranged in a directed
//! communication graph. A declarative chart yields the topology: which
//! agents the external caller may address, and which agents may message
//! which. Every ordered agent pair gets exactly one conversation thread,
//! every agent with outgoing links gets a synthesized `send_message`
//! capability scoped to its legal recipients, and all tools share one
//! partitioned memory store.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agency`] | Chart parsing, agents, threads, delegation, shared memory |
//! | [`backend`] | Completion backend contract + assistants-style HTTP client |
//! | [`tools`] | Tool contract and the built-in memory/workflow tools |
//! | [`persistence`] | Settings and thread-id persistence collaborators |
//! | [`error`] | Error types (`thiserror`) |
//! | [`paths`] | Config directory layout |

pub mod agency;
pub mod backend;
pub mod error;
pub mod paths;
pub mod persistence;
pub mod tools;

pub use agency::{
    Agency, AgencyConfig, AgencyEvent, AgencyGraph, Agent, ChartNode, Completion, DispatchMode,
    FileEntry, MemorySource, MemoryStore,
};
pub use backend::http::{HttpBackend, HttpBackendConfig};
pub use backend::CompletionBackend;
pub use error::{AgencyError, BackendError, PersistError};
pub use persistence::{JsonSettingsStore, JsonThreadStore, SettingsStore, ThreadStore};
pub use tools::{Tool, ToolContext, ToolResult};
