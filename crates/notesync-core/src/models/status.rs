//! Note status model

use serde::{Deserialize, Serialize};

use super::Note;

/// Persistence and sync state of one note, as shown to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStatus {
    /// Written to disk after the last modification
    pub saved: bool,
    /// Reconciled with the remote after the last modification
    pub synced: bool,
    /// Modified since the last write to disk
    pub modified: bool,
    /// A full sync pass is running
    pub full_syncing: bool,
}

impl NoteStatus {
    /// Derive the status of a note.
    pub fn of(note: &Note, full_syncing: bool) -> Self {
        let saved = note.save_date > note.modify_date;
        Self {
            saved,
            synced: note.sync_date > note.modify_date,
            modified: !saved,
            full_syncing,
        }
    }
}

/// Which bookkeeping date changed in a status-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusField {
    SaveDate,
    ModifyDate,
    SyncDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_note_is_modified_and_unsynced() {
        let note = Note::new("a");
        let status = NoteStatus::of(&note, false);
        assert!(!status.saved);
        assert!(status.modified);
        assert!(!status.synced);
    }

    #[test]
    fn test_saved_and_synced_note() {
        let mut note = Note::new("a");
        note.save_date = note.modify_date + 1.0;
        note.sync_date = note.modify_date + 1.0;
        let status = NoteStatus::of(&note, true);
        assert!(status.saved);
        assert!(!status.modified);
        assert!(status.synced);
        assert!(status.full_syncing);
    }
}
