//! Note store configuration.
//!
//! `NotesConfig` is plain data: front ends load it from wherever they keep
//! their settings and hand it to [`crate::NotesDb`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_SYNC_DEBOUNCE_SECS: f64 = 3.0;
const DEFAULT_TXT_EXTENSIONS: &[&str] = &["txt", "mkdn", "md", "mdown", "markdown"];

/// How `filter` interprets a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// `tag:` prefixes, quoted phrases and bare words
    #[default]
    Gstyle,
    /// The query is a regular expression
    Regexp,
}

/// Primary ordering of filter results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    Alpha,
    AlphaNum,
    #[default]
    ModificationDate,
    CreationDate,
}

/// Configuration of a note database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Directory holding one JSON file per note
    pub db_path: PathBuf,
    /// Whether a remote service is in use
    #[serde(default)]
    pub sync_enabled: bool,
    /// Quiet time after the last edit before a note is sent to the remote
    #[serde(default = "default_sync_debounce_secs")]
    pub sync_debounce_secs: f64,
    /// Mirror every note as a plain text file named after its title
    #[serde(default)]
    pub notes_as_txt: bool,
    /// Directory of the text mirror (defaults to `<db_path>/notes`)
    #[serde(default)]
    pub txt_path: Option<PathBuf>,
    /// Extensions picked up as text notes by the mirror
    #[serde(default = "default_txt_extensions")]
    pub read_txt_extensions: Vec<String>,
    /// Use `_` instead of spaces in mirrored file names
    #[serde(default)]
    pub replace_filename_spaces: bool,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Regexp mode also matches tags
    #[serde(default = "default_true")]
    pub search_tags: bool,
    #[serde(default)]
    pub sort_mode: SortMode,
    #[serde(default = "default_true")]
    pub pinned_on_top: bool,
}

const fn default_sync_debounce_secs() -> f64 {
    DEFAULT_SYNC_DEBOUNCE_SECS
}

const fn default_true() -> bool {
    true
}

fn default_txt_extensions() -> Vec<String> {
    DEFAULT_TXT_EXTENSIONS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl NotesConfig {
    /// Configuration with defaults for everything but the database directory.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            sync_enabled: false,
            sync_debounce_secs: DEFAULT_SYNC_DEBOUNCE_SECS,
            notes_as_txt: false,
            txt_path: None,
            read_txt_extensions: default_txt_extensions(),
            replace_filename_spaces: false,
            search_mode: SearchMode::default(),
            case_sensitive: false,
            search_tags: true,
            sort_mode: SortMode::default(),
            pinned_on_top: true,
        }
    }

    /// Enable syncing with a remote service
    #[must_use]
    pub const fn with_sync(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Enable the plain text mirror
    #[must_use]
    pub fn with_text_mirror(mut self, txt_path: impl Into<PathBuf>) -> Self {
        self.notes_as_txt = true;
        self.txt_path = Some(txt_path.into());
        self
    }

    /// Directory of the text mirror.
    pub fn txt_dir(&self) -> PathBuf {
        self.txt_path
            .clone()
            .unwrap_or_else(|| self.db_path.join("notes"))
    }

    pub fn sync_debounce(&self) -> Duration {
        Duration::from_secs_f64(self.sync_debounce_secs.max(0.0))
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::Config("db_path must not be empty".to_string()));
        }
        if !self.sync_debounce_secs.is_finite() || self.sync_debounce_secs < 0.0 {
            return Err(Error::Config(
                "sync_debounce_secs must be a non-negative number".to_string(),
            ));
        }
        if self.notes_as_txt && self.read_txt_extensions.is_empty() {
            return Err(Error::Config(
                "read_txt_extensions must not be empty when notes_as_txt is set".to_string(),
            ));
        }
        Ok(())
    }
}
