//! Error types for the agency core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while constructing or driving an agency.
#[derive(Debug, Error)]
pub enum AgencyError {
    #[error("agency chart cannot be empty")]
    EmptyChart,

    #[error("agency chart must declare at least one top-level agent")]
    NoTopLevelAgent,

    #[error("agency chart contains an empty agent list")]
    EmptyClique,

    #[error("agent names must be unique: '{0}' is declared more than once")]
    DuplicateAgentName(String),

    #[error("agent '{0}' is not registered in this agency")]
    UnknownAgent(String),

    #[error("'{0}' is not a main recipient and cannot be messaged directly")]
    NotMainRecipient(String),

    #[error("agent '{0}' has no backend identity; initialize the agency first")]
    UnregisteredAgent(String),

    #[error("failed to read shared instructions from {path}: {source}")]
    SharedInstructions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("completion task aborted: {0}")]
    TaskAborted(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors surfaced by the completion backend collaborator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("run {run_id} failed: {message}")]
    RunFailed { run_id: String, message: String },

    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

/// Errors from the settings / thread persistence collaborators.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed persisted state in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
