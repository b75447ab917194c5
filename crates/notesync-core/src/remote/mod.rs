//! Remote note service boundary.
//!
//! The engine only needs four blocking operations from the service. Failures
//! are reported as an opaque [`RemoteError`] diagnostic; the engine never
//! inspects it beyond logging and surfacing it.

mod directory;
mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Note, NoteKey};

pub use directory::DirectoryRemote;
pub use memory::{FailureMode, MemoryRemote, RemoteOp};

/// Opaque failure reported by a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RemoteError(String);

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A note as the remote service returns it.
///
/// `content` is absent in metadata-only listings and in update responses
/// where the body did not change. The dates are absent when the service does
/// not track them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub key: NoteKey,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub system_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_date: Option<f64>,
    #[serde(default)]
    pub deleted: bool,
}

impl RemoteNote {
    /// Remote copy of a local note under the given key and version.
    pub fn from_note(key: NoteKey, version: u64, note: &Note) -> Self {
        Self {
            key,
            version,
            content: Some(note.content.clone()),
            tags: note.tags.clone(),
            system_tags: note.system_tags.clone(),
            create_date: Some(note.create_date),
            modify_date: Some(note.modify_date),
            deleted: note.deleted,
        }
    }

    /// Whether this copy supersedes the local one.
    ///
    /// Compares modification dates, or versions when the remote copy carries
    /// no modification date.
    pub fn is_newer_than(&self, local: &Note) -> bool {
        self.modify_date.map_or_else(
            || self.version > local.remote_version.unwrap_or(0),
            |modify_date| modify_date > local.modify_date,
        )
    }

    /// Same copy without its body, as returned by metadata-only listings.
    #[must_use]
    pub fn without_content(mut self) -> Self {
        self.content = None;
        self
    }
}

/// Blocking client of the remote note service.
///
/// Implementations must tolerate being shared between the sync worker and a
/// full-sync thread; the engine itself never issues two calls at once.
pub trait RemoteService: Send + Sync {
    /// Store a note that has no remote key yet; the response carries the key.
    fn create(&self, note: &Note) -> RemoteResult<RemoteNote>;

    /// Store a new revision of a note that already has a remote key.
    fn update(&self, note: &Note) -> RemoteResult<RemoteNote>;

    /// Fetch the full current copy of one note.
    fn get(&self, key: &NoteKey) -> RemoteResult<RemoteNote>;

    /// List every note the service holds, with or without bodies.
    fn list(&self, include_content: bool) -> RemoteResult<Vec<RemoteNote>>;
}
