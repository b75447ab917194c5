//! notesync-core - Core library for notesync
//!
//! This crate contains the note model, the file-backed note store, the
//! in-memory note table with its background save and sync workers, and the
//! remote service boundary used by every notesync front end.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod remote;
pub mod search;
pub mod store;
pub mod util;

pub use config::{NotesConfig, SearchMode, SortMode};
pub use db::{FatalHandler, NotesDb, NotesDbBuilder, SyncTick};
pub use error::{Error, Result};
pub use events::{EventBus, NoteEvent, Subscription};
pub use models::{Note, NoteKey, NoteStatus, StatusField};
pub use remote::{DirectoryRemote, MemoryRemote, RemoteError, RemoteNote, RemoteService};
pub use search::{FilterResult, NoteInfo};
