//! Data models for notesync

mod note;
mod status;

pub use note::{Note, NoteKey, PINNED_TAG};
pub use status::{NoteStatus, StatusField};
