//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use notesync_core::NotesConfig;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Shared directory used as the remote note store
    #[serde(default)]
    pub remote_dir: Option<PathBuf>,
    #[serde(default = "default_notes_config")]
    pub notes: NotesConfig,
}

/// Configuration of one invocation after command line overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub notes: NotesConfig,
    pub remote_dir: Option<PathBuf>,
}

const fn default_config_version() -> u32 {
    1
}

fn default_notes_config() -> NotesConfig {
    NotesConfig::new(default_db_path())
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            remote_dir: None,
            notes: default_notes_config(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notesync")
        .join(CONFIG_FILE_NAME)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notesync")
        .join("notes")
}

pub fn normalize_path_option(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|path| !path.as_os_str().is_empty())
}

fn describe(action: &str, path: &Path, error: impl std::fmt::Display) -> String {
    format!("Failed to {action} config at {}: {error}", path.display())
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    /// Read the configuration at `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(describe("read", path, error)),
        };
        let mut config: Self =
            serde_json::from_str(&raw).map_err(|error| describe("parse", path, error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        let mut normalized = self.clone();
        normalized.normalize();
        let payload =
            serde_json::to_vec_pretty(&normalized).map_err(|error| describe("encode", path, error))?;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| describe("create directory for", path, error))?;
        }
        notesync_core::store::write_atomic(path, &payload).map_err(|error| describe("write", path, error))
    }

    /// Apply command line overrides.
    pub fn settings(&self, db_path: Option<PathBuf>, remote_dir: Option<PathBuf>) -> Settings {
        let mut notes = self.notes.clone();
        if let Some(db_path) = normalize_path_option(db_path) {
            notes.db_path = db_path;
        }
        let remote_dir = normalize_path_option(remote_dir).or_else(|| self.remote_dir.clone());
        notes.sync_enabled = remote_dir.is_some();
        Settings { notes, remote_dir }
    }

    fn normalize(&mut self) {
        self.version = default_config_version();
        self.remote_dir = normalize_path_option(self.remote_dir.take());
        self.notes.txt_path = normalize_path_option(self.notes.txt_path.take());
        if self.notes.db_path.as_os_str().is_empty() {
            self.notes.db_path = default_db_path();
        }
        self.notes.sync_enabled = self.remote_dir.is_some();
    }
}
