//! File-backed note persistence.
//!
//! Notes live in one directory, one `<key>.json` file per note. Writes go
//! through a temporary file in the same directory followed by a rename, so a
//! crash leaves either the old or the new file, never a torn one.

mod text_mirror;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::config::NotesConfig;
use crate::error::{Error, Result};
use crate::models::{Note, NoteKey};
use crate::util::unix_timestamp_now;

pub use text_mirror::TextMirror;

/// Write `bytes` to `path` atomically with respect to crashes.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Last modification time of a file as Unix seconds.
pub(crate) fn modified_secs(path: &Path) -> io::Result<f64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |duration| duration.as_secs_f64()))
}

/// A JSON note file found on disk.
#[derive(Debug)]
pub(crate) struct JsonEntry {
    pub key: NoteKey,
    pub path: PathBuf,
    pub note: Note,
}

/// Directory of JSON note files, with an optional plain text mirror.
#[derive(Debug)]
pub struct NoteStore {
    db_path: PathBuf,
    keep_tombstones: bool,
    mirror: Option<TextMirror>,
}

impl NoteStore {
    /// Open the store described by `config`, creating its directory.
    pub fn open(config: &NotesConfig) -> Result<Self> {
        fs::create_dir_all(&config.db_path)?;
        if config.notes_as_txt {
            fs::create_dir_all(config.txt_dir())?;
        }
        let mirror = config.notes_as_txt.then(|| TextMirror::new(config));
        Ok(Self {
            db_path: config.db_path.clone(),
            keep_tombstones: config.sync_enabled,
            mirror,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Load every persisted note.
    ///
    /// All-or-nothing: the first unreadable or malformed file fails the load.
    /// Loaded notes are stamped as saved now.
    pub fn load_all(&mut self) -> Result<BTreeMap<NoteKey, Note>> {
        let entries = self.read_all_json()?;
        let notes = match self.mirror.as_mut() {
            Some(mirror) => mirror.load(entries, self.keep_tombstones)?,
            None => {
                let now = unix_timestamp_now();
                entries
                    .into_iter()
                    .map(|mut entry| {
                        entry.note.save_date = entry.note.save_stamp(now);
                        (entry.key, entry.note)
                    })
                    .collect()
            }
        };
        tracing::info!(
            "Loaded {} notes from {}",
            notes.len(),
            self.db_path.display()
        );
        Ok(notes)
    }

    /// Persist one note under `key`.
    pub fn save(&mut self, key: &NoteKey, note: &Note) -> Result<()> {
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.save(key, note)?;
        }
        self.save_json(key, note)
    }

    /// Remove the JSON file of `key`; no-op when it does not exist.
    pub fn delete(&mut self, key: &NoteKey) -> Result<()> {
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.forget(key);
        }
        let path = self.key_to_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Deleted note file {}", path.display());
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Error::write(path, error)),
        }
    }

    /// Remove the mirrored text file of a note dropped from the table.
    pub fn delete_text_file(&mut self, key: &NoteKey, note: &Note) -> Result<()> {
        match self.mirror.as_mut() {
            Some(mirror) => mirror.remove_file(key, note),
            None => Ok(()),
        }
    }

    fn save_json(&self, key: &NoteKey, note: &Note) -> Result<()> {
        let path = self.key_to_path(key);

        if !self.keep_tombstones && note.deleted {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(Error::write(path, error)),
            };
        }

        let payload = serde_json::to_vec_pretty(note).map_err(|error| Error::write(&path, error))?;
        write_atomic(&path, &payload).map_err(|error| {
            tracing::error!("Error writing note file {}: {}", path.display(), error);
            Error::write(&path, error)
        })
    }

    fn read_all_json(&self) -> Result<Vec<JsonEntry>> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(&self.db_path).map_err(|error| Error::read(&self.db_path, error))?;
        for entry in entries {
            let path = entry.map_err(|error| Error::read(&self.db_path, error))?.path();
            if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let key = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(NoteKey::from)
                    .ok_or_else(|| Error::read(&path, "file name is not valid UTF-8"))?;
                let raw = fs::read(&path).map_err(|error| Error::read(&path, error))?;
                let note = serde_json::from_slice::<Note>(&raw).map_err(|error| {
                    tracing::error!("Error reading {}: {}", path.display(), error);
                    Error::read(&path, error)
                })?;
                Ok(JsonEntry { key, path, note })
            })
            .collect()
    }

    fn key_to_path(&self, key: &NoteKey) -> PathBuf {
        self.db_path.join(format!("{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, sync_enabled: bool) -> NoteStore {
        NoteStore::open(&NotesConfig::new(dir.path().join("db")).with_sync(sync_enabled)).unwrap()
    }

    #[test]
    fn save_then_load_reproduces_note() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, true);
        let key = NoteKey::generate();
        let mut note = Note::new("hello\nworld");
        note.add_tags(["work"]);
        note.remote_key = Some(NoteKey::from("K1"));
        note.remote_version = Some(4);

        store.save(&key, &note).unwrap();
        let loaded = store.load_all().unwrap();

        assert_eq!(loaded.len(), 1);
        let reloaded = &loaded[&key];
        assert!(reloaded.is_identical(&note));
        assert!(reloaded.save_date > 0.0);
        assert!(!reloaded.needs_save());
    }

    #[test]
    fn load_fails_on_malformed_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, true);
        store.save(&NoteKey::generate(), &Note::new("fine")).unwrap();
        fs::write(store.db_path().join("broken.json"), "{ not json").unwrap();

        let error = store.load_all().unwrap_err();
        assert!(matches!(error, Error::Read { .. }));
    }

    #[test]
    fn load_ignores_temporary_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, true);
        fs::write(store.db_path().join(".tmpXYZ"), "partial").unwrap();
        fs::write(store.db_path().join("notes.txt"), "text").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn delete_is_noop_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, true);
        let key = NoteKey::generate();
        store.delete(&key).unwrap();

        store.save(&key, &Note::new("a")).unwrap();
        store.delete(&key).unwrap();
        assert!(!store.key_to_path(&key).exists());
    }

    #[test]
    fn tombstone_removes_file_without_sync() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, false);
        let key = NoteKey::generate();
        let mut note = Note::new("a");
        store.save(&key, &note).unwrap();

        note.mark_deleted();
        store.save(&key, &note).unwrap();
        assert!(!store.key_to_path(&key).exists());
    }

    #[test]
    fn tombstone_kept_with_sync() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir, true);
        let key = NoteKey::generate();
        let mut note = Note::new("a");
        note.mark_deleted();
        store.save(&key, &note).unwrap();
        assert!(store.load_all().unwrap()[&key].deleted);
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
