use std::io;

use notesync_core::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] notesync_core::Error),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note key cannot be empty")]
    EmptyNoteKey,
    #[error("No tags provided")]
    EmptyTags,
    #[error("Note not found for key/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteKey(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Pass --remote-dir or run `notesync config init --remote-dir <PATH>`."
    )]
    SyncNotConfigured,
}
