//! Error types for notesync-core

use std::path::PathBuf;

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using notesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A note file could not be read or parsed at load time
    #[error("Error reading note file {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    /// A note file could not be written
    #[error("Error writing note file {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// Remote coordination failed badly enough to abort a full sync
    #[error("Sync error: {0}")]
    Sync(String),

    /// Remote service reported a failure
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
