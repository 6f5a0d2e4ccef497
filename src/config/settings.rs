// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Parlance
//!
//! Handles loading and saving settings from ~/.parlance/settings.json

use serde::{Deserialize, Serialize};

mod io;
mod validation;

/// Main settings structure, stored in ~/.parlance/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Persisted session history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Workspace storage location settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Built-in echo provider settings
    #[serde(default)]
    pub echo: EchoConfig,
}

/// Persisted session history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of sessions written back on save
    #[serde(default = "default_max_persisted_sessions")]
    pub max_persisted_sessions: usize,

    /// Key under which the session blob is stored
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_persisted_sessions: default_max_persisted_sessions(),
            storage_key: default_storage_key(),
        }
    }
}

/// Location of the workspace-scoped key-value store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory created inside the workspace
    #[serde(default = "default_workspace_dir_name")]
    pub workspace_dir_name: String,

    /// File name of the store inside that directory
    #[serde(default = "default_storage_file_name")]
    pub file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workspace_dir_name: default_workspace_dir_name(),
            file_name: default_storage_file_name(),
        }
    }
}

/// Echo provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoConfig {
    /// Delay between streamed chunks, in milliseconds
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_max_persisted_sessions() -> usize {
    25
}

fn default_storage_key() -> String {
    "interactive.sessions".to_string()
}

fn default_workspace_dir_name() -> String {
    ".parlance".to_string()
}

fn default_storage_file_name() -> String {
    "storage.json".to_string()
}

fn default_chunk_delay_ms() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.history.max_persisted_sessions, 25);
        assert_eq!(settings.history.storage_key, "interactive.sessions");
        assert_eq!(settings.storage.workspace_dir_name, ".parlance");
        assert_eq!(settings.storage.file_name, "storage.json");
        assert_eq!(settings.echo.chunk_delay_ms, 15);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"history": {"max_persisted_sessions": 3}}"#).unwrap();
        assert_eq!(settings.history.max_persisted_sessions, 3);
        assert_eq!(settings.history.storage_key, "interactive.sessions");
        assert_eq!(settings.echo.chunk_delay_ms, 15);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.history.max_persisted_sessions = 7;
        settings.echo.chunk_delay_ms = 0;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.history.max_persisted_sessions, 7);
        assert_eq!(loaded.echo.chunk_delay_ms, 0);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Settings::load_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.history.max_persisted_sessions, 25);
    }

    #[test]
    fn test_workspace_storage_path() {
        let settings = Settings::default();
        let path = settings.workspace_storage_path(std::path::Path::new("/work/project"));
        assert_eq!(
            path,
            std::path::PathBuf::from("/work/project/.parlance/storage.json")
        );
    }
}
