//! Remote service backed by a shared directory.
//!
//! Each remote note is one `<key>.json` file. Any number of clients can point
//! at the same directory (a network share, a synced folder) and reconcile
//! through it.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{RemoteError, RemoteNote, RemoteResult, RemoteService};
use crate::models::{Note, NoteKey};
use crate::store::write_atomic;

/// Remote service storing notes as JSON files in a directory.
#[derive(Debug)]
pub struct DirectoryRemote {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DirectoryRemote {
    /// Open the remote directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> RemoteResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|error| {
            RemoteError::new(format!("cannot create {}: {error}", root.display()))
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &NoteKey) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn read(&self, key: &NoteKey) -> RemoteResult<RemoteNote> {
        let path = self.path_for(key);
        let raw = fs::read(&path)
            .map_err(|error| RemoteError::new(format!("cannot read {}: {error}", path.display())))?;
        serde_json::from_slice(&raw)
            .map_err(|error| RemoteError::new(format!("corrupt {}: {error}", path.display())))
    }

    fn write(&self, note: &RemoteNote) -> RemoteResult<()> {
        let path = self.path_for(&note.key);
        let payload = serde_json::to_vec_pretty(note)
            .map_err(|error| RemoteError::new(format!("cannot encode {}: {error}", note.key)))?;
        write_atomic(&path, &payload)
            .map_err(|error| RemoteError::new(format!("cannot write {}: {error}", path.display())))
    }
}

impl RemoteService for DirectoryRemote {
    fn create(&self, note: &Note) -> RemoteResult<RemoteNote> {
        let _guard = self.write_lock.lock();
        let mut key = NoteKey::generate();
        while self.path_for(&key).exists() {
            key = NoteKey::generate();
        }
        let stored = RemoteNote::from_note(key, 1, note);
        self.write(&stored)?;
        tracing::debug!("Created remote note {}", stored.key);
        Ok(stored)
    }

    fn update(&self, note: &Note) -> RemoteResult<RemoteNote> {
        let _guard = self.write_lock.lock();
        let key = note
            .remote_key
            .clone()
            .ok_or_else(|| RemoteError::new("update without key"))?;
        let existing = self.read(&key)?;
        let content_changed = existing.content.as_deref() != Some(note.content.as_str());
        let stored = RemoteNote::from_note(key, existing.version + 1, note);
        self.write(&stored)?;
        if content_changed {
            Ok(stored)
        } else {
            Ok(stored.without_content())
        }
    }

    fn get(&self, key: &NoteKey) -> RemoteResult<RemoteNote> {
        self.read(key)
    }

    fn list(&self, include_content: bool) -> RemoteResult<Vec<RemoteNote>> {
        let entries = fs::read_dir(&self.root).map_err(|error| {
            RemoteError::new(format!("cannot list {}: {error}", self.root.display()))
        })?;

        let mut notes = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|error| RemoteError::new(error.to_string()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let note = self.read(&NoteKey::from(stem))?;
            notes.push(if include_content {
                note
            } else {
                note.without_content()
            });
        }
        notes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(notes)
    }
}
