//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".hive";

/// Get the hive config directory (~/.hive)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the saved workflows directory (~/.hive/workflows)
pub fn workflows_dir() -> PathBuf {
    config_dir().join("workflows")
}

/// Get the default settings file (~/.hive/settings.json)
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Get the logs directory (~/.hive/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure the workflows directory exists, creating it if necessary
pub fn ensure_workflows_dir() -> std::io::Result<PathBuf> {
    let dir = workflows_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
