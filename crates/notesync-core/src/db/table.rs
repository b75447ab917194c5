//! In-memory note table.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{Note, NoteKey};

/// The working set of notes, keyed by local key.
///
/// Always accessed behind the database's table mutex.
#[derive(Debug, Default)]
pub(crate) struct NoteTable {
    notes: BTreeMap<NoteKey, Note>,
}

impl NoteTable {
    pub fn new(notes: BTreeMap<NoteKey, Note>) -> Self {
        Self { notes }
    }

    /// A random key no note in the table uses.
    pub fn fresh_key(&self) -> NoteKey {
        loop {
            let key = NoteKey::generate();
            if !self.notes.contains_key(&key) {
                return key;
            }
        }
    }

    pub fn get(&self, key: &NoteKey) -> Option<&Note> {
        self.notes.get(key)
    }

    pub fn get_mut(&mut self, key: &NoteKey) -> Option<&mut Note> {
        self.notes.get_mut(key)
    }

    pub fn note(&self, key: &NoteKey) -> Result<&Note> {
        self.notes
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub fn note_mut(&mut self, key: &NoteKey) -> Result<&mut Note> {
        self.notes
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &NoteKey) -> bool {
        self.notes.contains_key(key)
    }

    pub fn insert(&mut self, key: NoteKey, note: Note) {
        self.notes.insert(key, note);
    }

    pub fn remove(&mut self, key: &NoteKey) -> Option<Note> {
        self.notes.remove(key)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NoteKey, &Note)> {
        self.notes.iter()
    }

    pub fn keys(&self) -> Vec<NoteKey> {
        self.notes.keys().cloned().collect()
    }

    /// Keys of notes that have to be sent to the remote, in key order.
    pub fn keys_needing_sync(&self) -> Vec<NoteKey> {
        self.notes
            .iter()
            .filter(|(_, note)| note.needs_sync())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Local key of the note the remote knows under `remote_key`.
    ///
    /// A note that was never accepted by the remote is matched by its local
    /// key, which is how notes pulled from the remote are stored.
    pub fn find_remote(&self, remote_key: &NoteKey) -> Option<NoteKey> {
        if let Some(note) = self.notes.get(remote_key) {
            if !matches!(&note.remote_key, Some(key) if key != remote_key) {
                return Some(remote_key.clone());
            }
        }
        self.notes
            .iter()
            .find(|(_, note)| note.remote_key.as_ref() == Some(remote_key))
            .map(|(key, _)| key.clone())
    }

    /// Move a note to a new key. Returns false when `from` is unknown or
    /// `to` is taken by another note.
    pub fn rekey(&mut self, from: &NoteKey, to: &NoteKey) -> bool {
        if from == to || self.notes.contains_key(to) {
            return false;
        }
        match self.notes.remove(from) {
            Some(note) => {
                self.notes.insert(to.clone(), note);
                true
            }
            None => false,
        }
    }
}
