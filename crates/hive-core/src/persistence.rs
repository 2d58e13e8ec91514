//! Settings and thread persistence collaborators.
//!
//! Both are small two-operation interfaces; an agency constructed
//! without them simply skips the round-trips. The JSON file
//! implementations treat a missing file as empty state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::PersistError;

/// Conversation ids keyed initiator name -> recipient name.
pub type ThreadIdMap = HashMap<String, HashMap<String, String>>;

/// Round-trips the agency's settings blob.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Value, PersistError>;
    fn save(&self, settings: &Value) -> Result<(), PersistError>;
}

/// Round-trips the thread id table across process restarts.
pub trait ThreadStore: Send + Sync {
    fn load(&self) -> Result<ThreadIdMap, PersistError>;
    fn save(&self, threads: &ThreadIdMap) -> Result<(), PersistError>;
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T, PersistError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PersistError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let rendered =
        serde_json::to_string_pretty(value).map_err(|source| PersistError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    std::fs::write(path, rendered).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Settings persisted as a pretty-printed JSON file.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Value, PersistError> {
        read_json(&self.path)
    }

    fn save(&self, settings: &Value) -> Result<(), PersistError> {
        write_json(&self.path, settings)
    }
}

/// Thread id table persisted as a pretty-printed JSON file.
pub struct JsonThreadStore {
    path: PathBuf,
}

impl JsonThreadStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ThreadStore for JsonThreadStore {
    fn load(&self) -> Result<ThreadIdMap, PersistError> {
        read_json(&self.path)
    }

    fn save(&self, threads: &ThreadIdMap) -> Result<(), PersistError> {
        write_json(&self.path, threads)
    }
}
